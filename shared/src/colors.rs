/// Parse a `#rgb` or `#rrggbb` hex color. Returns `None` for anything else.
pub fn parse_hex(hex: &str) -> Option<(u8, u8, u8)> {
    let digits = hex.trim().trim_start_matches('#');
    match digits.len() {
        3 => {
            let mut out = [0u8; 3];
            for (slot, ch) in out.iter_mut().zip(digits.chars()) {
                let v = ch.to_digit(16)? as u8;
                *slot = v * 16 + v;
            }
            Some((out[0], out[1], out[2]))
        }
        6 => {
            let r = u8::from_str_radix(digits.get(0..2)?, 16).ok()?;
            let g = u8::from_str_radix(digits.get(2..4)?, 16).ok()?;
            let b = u8::from_str_radix(digits.get(4..6)?, 16).ok()?;
            Some((r, g, b))
        }
        _ => None,
    }
}

/// Convert a hex color plus alpha into a CSS `rgba(...)` string.
///
/// Named CSS colors (e.g. `"red"`) cannot carry a separate alpha here, so they
/// are passed through unchanged and the caller's global alpha applies.
pub fn hex_to_rgba(hex: &str, alpha: f64) -> String {
    match parse_hex(hex) {
        Some((r, g, b)) => rgba_css(r, g, b, alpha.clamp(0.0, 1.0)),
        None => hex.to_string(),
    }
}

/// Format RGBA as a CSS color string.
pub fn rgba_css(r: u8, g: u8, b: u8, a: f64) -> String {
    format!("rgba({r}, {g}, {b}, {a})")
}

/// Marker colour for a simulation side.
pub fn side_color(side: &str) -> (u8, u8, u8) {
    match side.to_ascii_uppercase().as_str() {
        "OPFOR" | "EAST" => (204, 32, 32),
        "BLUFOR" | "WEST" => (32, 72, 204),
        "INDEPENDENT" | "GUER" | "RESISTANCE" => (32, 150, 48),
        _ => (140, 120, 40),
    }
}

#[cfg(test)]
mod tests {
    use super::{hex_to_rgba, parse_hex, side_color};

    #[test]
    fn parse_hex_long_and_short_forms() {
        assert_eq!(parse_hex("#ff0000"), Some((255, 0, 0)));
        assert_eq!(parse_hex("00AA00"), Some((0, 170, 0)));
        assert_eq!(parse_hex("#0af"), Some((0, 170, 255)));
    }

    #[test]
    fn parse_hex_rejects_garbage() {
        assert_eq!(parse_hex("red"), None);
        assert_eq!(parse_hex("#12345"), None);
        assert_eq!(parse_hex("#zzzzzz"), None);
    }

    #[test]
    fn hex_to_rgba_embeds_alpha() {
        assert_eq!(hex_to_rgba("#000000", 0.8), "rgba(0, 0, 0, 0.8)");
        assert_eq!(hex_to_rgba("#fff", 2.0), "rgba(255, 255, 255, 1)");
    }

    #[test]
    fn hex_to_rgba_passes_named_colors_through() {
        assert_eq!(hex_to_rgba("white", 0.5), "white");
    }

    #[test]
    fn side_colors_are_distinct() {
        assert_ne!(side_color("OPFOR"), side_color("BLUFOR"));
        assert_eq!(side_color("opfor"), side_color("EAST"));
    }
}
