use std::cell::RefCell;
use std::rc::Rc;

use wasm_bindgen::prelude::*;

use tactical_shared::{FrameCoalescer, ViewEvent};

/// Batches redraw requests via `requestAnimationFrame`.
///
/// Any number of `request()` calls between two frames produce one call of the
/// render function.
pub struct RenderScheduler {
    inner: Rc<Inner>,
}

struct Inner {
    window: Option<web_sys::Window>,
    coalescer: RefCell<FrameCoalescer>,
    raf_id: RefCell<Option<i32>>,
    callback: RefCell<Option<Closure<dyn FnMut()>>>,
}

impl Inner {
    fn schedule(&self) {
        let cb_ref = self.callback.borrow();
        let Some(cb) = cb_ref.as_ref() else {
            return;
        };
        let Some(window) = self.window.as_ref() else {
            self.coalescer.borrow_mut().take_frame();
            return;
        };
        match window.request_animation_frame(cb.as_ref().unchecked_ref()) {
            Ok(id) => *self.raf_id.borrow_mut() = Some(id),
            // Drop the pending flag so the next request retries
            Err(_) => {
                self.coalescer.borrow_mut().take_frame();
            }
        }
    }
}

impl RenderScheduler {
    pub fn new(render_fn: impl Fn() + 'static) -> Self {
        let inner = Rc::new(Inner {
            window: web_sys::window(),
            coalescer: RefCell::new(FrameCoalescer::new()),
            raf_id: RefCell::new(None),
            callback: RefCell::new(None),
        });

        let inner_cb = inner.clone();
        let cb = Closure::<dyn FnMut()>::new(move || {
            inner_cb.raf_id.borrow_mut().take();
            let due = inner_cb.coalescer.borrow_mut().take_frame();
            if due {
                render_fn();
            }
        });
        *inner.callback.borrow_mut() = Some(cb);

        Self { inner }
    }

    /// Ask for a repaint because of `_event`. Schedules at most one frame.
    pub fn request(&self, _event: ViewEvent) {
        let first = self.inner.coalescer.borrow_mut().request();
        if first {
            self.inner.schedule();
        }
    }
}

impl Drop for RenderScheduler {
    fn drop(&mut self) {
        if let Some(raf_id) = self.inner.raf_id.borrow_mut().take()
            && let Some(window) = self.inner.window.as_ref()
        {
            let _ = window.cancel_animation_frame(raf_id);
        }
        // Break the callback->inner reference cycle on teardown.
        self.inner.callback.borrow_mut().take();
    }
}
