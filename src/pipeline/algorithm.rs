//! The shadow algorithms the demo switches between

use std::fmt;

/// Shadow technique used by the final shading pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, clap::ValueEnum)]
pub enum ShadowAlgorithm {
    /// Single depth comparison
    #[default]
    Basic,
    /// Depth comparison with a slope-scaled bias
    Biased,
    /// Percentage-closer filtering
    Pcf,
    /// Percentage-closer soft shadows
    Pcss,
    /// Variance soft shadow maps over a blurred moment texture
    Vssm,
    /// Moment shadow maps
    Msm,
}

impl ShadowAlgorithm {
    pub const ALL: [ShadowAlgorithm; 6] = [
        ShadowAlgorithm::Basic,
        ShadowAlgorithm::Biased,
        ShadowAlgorithm::Pcf,
        ShadowAlgorithm::Pcss,
        ShadowAlgorithm::Vssm,
        ShadowAlgorithm::Msm,
    ];

    /// Keys '1' through '6' select an algorithm
    pub fn from_key(key: char) -> Option<Self> {
        let index = key.to_digit(10)?.checked_sub(1)?;
        Self::ALL.get(index as usize).copied()
    }

    /// Text drawn by the overlay
    pub fn label(&self) -> &'static str {
        match self {
            ShadowAlgorithm::Basic => "Basic Shadow",
            ShadowAlgorithm::Biased => "Basic Shadow with bias",
            ShadowAlgorithm::Pcf => "PCF Shadow",
            ShadowAlgorithm::Pcss => "PCSS Shadow",
            ShadowAlgorithm::Vssm => "VSSM Shadow",
            ShadowAlgorithm::Msm => "MSM Shadow",
        }
    }

    /// Window position of the overlay label, in physical pixels
    pub fn label_anchor(&self) -> (f32, f32) {
        match self {
            ShadowAlgorithm::Biased => (770.0, 170.0),
            _ => (840.0, 170.0),
        }
    }

    /// Fragment shader file of the shading program
    pub fn fragment_shader(&self) -> &'static str {
        match self {
            ShadowAlgorithm::Basic => "shadow_basic.frag.wgsl",
            ShadowAlgorithm::Biased => "shadow_bias.frag.wgsl",
            ShadowAlgorithm::Pcf => "shadow_pcf.frag.wgsl",
            ShadowAlgorithm::Pcss => "shadow_pcss.frag.wgsl",
            ShadowAlgorithm::Vssm => "shadow_vssm.frag.wgsl",
            ShadowAlgorithm::Msm => "shadow_msm.frag.wgsl",
        }
    }

    /// Whether the depth pass renders moments that get blurred before shading
    pub fn uses_moments(&self) -> bool {
        matches!(self, ShadowAlgorithm::Vssm)
    }
}

impl fmt::Display for ShadowAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_select_algorithms() {
        assert_eq!(ShadowAlgorithm::from_key('1'), Some(ShadowAlgorithm::Basic));
        assert_eq!(ShadowAlgorithm::from_key('3'), Some(ShadowAlgorithm::Pcf));
        assert_eq!(ShadowAlgorithm::from_key('5'), Some(ShadowAlgorithm::Vssm));
        assert_eq!(ShadowAlgorithm::from_key('6'), Some(ShadowAlgorithm::Msm));
    }

    #[test]
    fn test_other_keys_are_ignored() {
        for key in ['0', '7', '9', 'a', ' ', 'q'] {
            assert_eq!(ShadowAlgorithm::from_key(key), None, "key {key:?}");
        }
    }

    #[test]
    fn test_labels_and_anchors() {
        assert_eq!(ShadowAlgorithm::Biased.label(), "Basic Shadow with bias");
        assert_eq!(ShadowAlgorithm::Biased.label_anchor(), (770.0, 170.0));
        assert_eq!(ShadowAlgorithm::Msm.label_anchor(), (840.0, 170.0));
        assert_eq!(ShadowAlgorithm::Pcss.to_string(), "PCSS Shadow");
    }

    #[test]
    fn test_only_vssm_uses_moments() {
        let moment_users: Vec<_> = ShadowAlgorithm::ALL
            .into_iter()
            .filter(ShadowAlgorithm::uses_moments)
            .collect();
        assert_eq!(moment_users, vec![ShadowAlgorithm::Vssm]);
    }
}
