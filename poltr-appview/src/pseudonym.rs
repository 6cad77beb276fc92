//! Pseudonym generation: a random Mountain-template, a random uppercase
//! initial, and a random color bounded to a visible luma range.
//!
//! Grounded directly on `original_source/auth/pseudonym_generator.py`:
//! same ITU-R BT.709 luma formula and `[30, 180]` exclusive bounds.

use rand::Rng;

use poltr_db::models::MountainTemplate;

const LUMA_MIN: f64 = 30.0;
const LUMA_MAX: f64 = 180.0;

#[derive(Debug, Clone)]
pub struct Pseudonym {
    pub template_id: i64,
    pub display_name: String,
    pub mountain_name: String,
    pub mountain_fullname: String,
    pub canton: String,
    pub height: f64,
    pub color: String,
}

/// Draws a random visible color: rejection-sample RGB triples until the
/// perceived luma falls strictly inside `(LUMA_MIN, LUMA_MAX)`.
pub fn random_color() -> String {
    let mut rng = rand::thread_rng();
    loop {
        let r: u8 = rng.gen();
        let g: u8 = rng.gen();
        let b: u8 = rng.gen();
        let luma = 0.2126 * r as f64 + 0.7152 * g as f64 + 0.0722 * b as f64;
        if luma > LUMA_MIN && luma < LUMA_MAX {
            return format!("#{r:02x}{g:02x}{b:02x}");
        }
    }
}

fn random_uppercase_letter() -> char {
    let idx = rand::thread_rng().gen_range(0..26u8);
    (b'A' + idx) as char
}

pub fn build_pseudonym(template: &MountainTemplate) -> Pseudonym {
    let letter = random_uppercase_letter();
    Pseudonym {
        template_id: template.id,
        display_name: format!("{letter}. {}", template.name),
        mountain_name: template.name.clone(),
        mountain_fullname: template.fullname.clone(),
        canton: template.canton.clone(),
        height: template.height,
        color: random_color(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_color_stays_in_bounds_over_many_draws() {
        for _ in 0..500 {
            let hex = random_color();
            assert!(hex.starts_with('#'));
            assert_eq!(hex.len(), 7);
            let r = u8::from_str_radix(&hex[1..3], 16).unwrap() as f64;
            let g = u8::from_str_radix(&hex[3..5], 16).unwrap() as f64;
            let b = u8::from_str_radix(&hex[5..7], 16).unwrap() as f64;
            let luma = 0.2126 * r + 0.7152 * g + 0.0722 * b;
            assert!(luma > LUMA_MIN && luma < LUMA_MAX);
        }
    }

    #[test]
    fn display_name_is_letter_dot_space_mountain() {
        let template = MountainTemplate {
            id: 1,
            name: "Eiger".into(),
            fullname: "Eiger".into(),
            canton: "BE".into(),
            height: 3967.0,
        };
        let p = build_pseudonym(&template);
        assert!(p.display_name.ends_with(". Eiger"));
        assert_eq!(p.display_name.len(), "X. Eiger".len());
    }
}
