//! On-screen label naming the active shadow algorithm
//!
//! Drawn with egui on top of the shaded frame, after the last graph pass.

mod renderer;

pub use self::renderer::TextOverlay;

use crate::pipeline::ShadowAlgorithm;

/// Height of the label text in physical pixels
pub const LABEL_SIZE: f32 = 40.0;

/// Where the label of `algorithm` goes, in egui points
pub fn label_position(algorithm: ShadowAlgorithm, pixels_per_point: f32) -> egui::Pos2 {
    let (x, y) = algorithm.label_anchor();
    let scale = pixels_per_point.max(f32::EPSILON);
    egui::pos2(x / scale, y / scale)
}

/// Label text style, sized in points so it stays `LABEL_SIZE` pixels tall
pub fn label_text(algorithm: ShadowAlgorithm, pixels_per_point: f32) -> egui::RichText {
    egui::RichText::new(algorithm.label())
        .size(LABEL_SIZE / pixels_per_point.max(f32::EPSILON))
        .color(egui::Color32::from_rgb(240, 240, 240))
        .strong()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_position_in_points() {
        assert_eq!(
            label_position(ShadowAlgorithm::Pcf, 1.0),
            egui::pos2(840.0, 170.0)
        );
        assert_eq!(
            label_position(ShadowAlgorithm::Biased, 2.0),
            egui::pos2(385.0, 85.0)
        );
    }

    #[test]
    fn test_label_text_matches_algorithm() {
        let text = label_text(ShadowAlgorithm::Vssm, 1.0);
        assert_eq!(text.text(), "VSSM Shadow");
    }
}
