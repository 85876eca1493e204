use super::args::BlendMode;
use crate::core::gfx::gpu::BlendState;

/// Fragment program variant, stored per face as `FaceData.Mode`.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SamplerMode {
    Texture = 0,
    Translated = 1,
    Shaded = 2,
    Stencil = 3,
    Fill = 4,
    Skycap = 5,
    Fuzz = 6,
    FogBoundary = 7,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendSetter {
    Opaque,
    Masked,
    AddClamp,
    SubClamp,
    RevSubClamp,
    AddSrcColor,
    Shaded,
    AddClampShaded,
}

use BlendSetter as B;
use SamplerMode as S;

static SAMPLER_MODES: [SamplerMode; BlendMode::COUNT] = [
    S::Texture,     // TextureOpaque
    S::Texture,     // TextureMasked
    S::Texture,     // TextureAdd
    S::Texture,     // TextureSub
    S::Texture,     // TextureRevSub
    S::Texture,     // TextureAddSrcColor
    S::Translated,  // TranslatedOpaque
    S::Translated,  // TranslatedMasked
    S::Translated,  // TranslatedAdd
    S::Translated,  // TranslatedSub
    S::Translated,  // TranslatedRevSub
    S::Translated,  // TranslatedAddSrcColor
    S::Shaded,      // Shaded
    S::Shaded,      // AddShaded
    S::Stencil,     // Stencil
    S::Stencil,     // AddStencil
    S::Fill,        // FillOpaque
    S::Fill,        // FillAdd
    S::Fill,        // FillSub
    S::Fill,        // FillRevSub
    S::Fill,        // FillAddSrcColor
    S::Skycap,      // Skycap
    S::Fuzz,        // Fuzz
    S::FogBoundary, // FogBoundary
];

static BLEND_SETTERS: [BlendSetter; BlendMode::COUNT] = [
    B::Opaque,         // TextureOpaque
    B::Masked,         // TextureMasked
    B::AddClamp,       // TextureAdd
    B::SubClamp,       // TextureSub
    B::RevSubClamp,    // TextureRevSub
    B::AddSrcColor,    // TextureAddSrcColor
    B::Opaque,         // TranslatedOpaque
    B::Masked,         // TranslatedMasked
    B::AddClamp,       // TranslatedAdd
    B::SubClamp,       // TranslatedSub
    B::RevSubClamp,    // TranslatedRevSub
    B::AddSrcColor,    // TranslatedAddSrcColor
    B::Shaded,         // Shaded
    B::AddClampShaded, // AddShaded
    B::Shaded,         // Stencil
    B::AddClampShaded, // AddStencil
    B::Opaque,         // FillOpaque
    B::AddClamp,       // FillAdd
    B::SubClamp,       // FillSub
    B::RevSubClamp,    // FillRevSub
    B::AddSrcColor,    // FillAddSrcColor
    B::Opaque,         // Skycap
    B::Shaded,         // Fuzz
    B::Opaque,         // FogBoundary
];

#[inline(always)]
pub fn sampler_mode(mode: BlendMode) -> SamplerMode {
    SAMPLER_MODES[mode.index()]
}

#[inline(always)]
pub fn blend_setter(mode: BlendMode) -> BlendSetter {
    BLEND_SETTERS[mode.index()]
}

impl BlendSetter {
    /// Blend state for a run with the given 0..=255 alphas. Only the clamp
    /// setters look at the alphas.
    pub fn state(self, src_alpha: u32, dest_alpha: u32) -> BlendState {
        match self {
            Self::Opaque => BlendState::DISABLED,
            Self::Masked | Self::Shaded => fixed(glow::ONE, glow::ONE_MINUS_SRC_ALPHA),
            Self::AddClamp => alpha_blend_func(glow::FUNC_ADD, src_alpha, dest_alpha),
            Self::SubClamp => alpha_blend_func(glow::FUNC_SUBTRACT, src_alpha, dest_alpha),
            Self::RevSubClamp => {
                alpha_blend_func(glow::FUNC_REVERSE_SUBTRACT, src_alpha, dest_alpha)
            }
            Self::AddSrcColor => fixed(glow::SRC_COLOR, glow::ONE_MINUS_SRC_COLOR),
            Self::AddClampShaded => fixed(glow::ONE, glow::ONE),
        }
    }
}

const fn fixed(src: u32, dst: u32) -> BlendState {
    BlendState {
        enabled: true,
        equation: glow::FUNC_ADD,
        src,
        dst,
        color: None,
    }
}

/// Translates the software renderer's integer alphas into constant-color
/// blend factors.
pub fn alpha_blend_func(equation: u32, src_alpha: u32, dest_alpha: u32) -> BlendState {
    let src = match src_alpha {
        0 => glow::ZERO,
        255 => glow::ONE,
        _ => glow::CONSTANT_ALPHA,
    };
    let dst = match dest_alpha {
        0 => glow::ZERO,
        255 => glow::ONE,
        _ if src_alpha.saturating_add(dest_alpha) >= 255 => glow::ONE_MINUS_CONSTANT_ALPHA,
        _ => glow::CONSTANT_COLOR,
    };
    let d = dest_alpha as f32 / 256.0;
    BlendState {
        enabled: true,
        equation,
        src,
        dst,
        color: Some([d, d, d, src_alpha as f32 / 256.0]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sampler_modes_group_by_family() {
        for mode in &BlendMode::ALL[0..6] {
            assert_eq!(sampler_mode(*mode), SamplerMode::Texture, "{mode:?}");
        }
        for mode in &BlendMode::ALL[6..12] {
            assert_eq!(sampler_mode(*mode), SamplerMode::Translated, "{mode:?}");
        }
        for mode in &BlendMode::ALL[16..21] {
            assert_eq!(sampler_mode(*mode), SamplerMode::Fill, "{mode:?}");
        }
        assert_eq!(sampler_mode(BlendMode::AddShaded), SamplerMode::Shaded);
        assert_eq!(sampler_mode(BlendMode::AddStencil), SamplerMode::Stencil);
        assert_eq!(sampler_mode(BlendMode::Skycap) as i32, 5);
        assert_eq!(sampler_mode(BlendMode::Fuzz) as i32, 6);
        assert_eq!(sampler_mode(BlendMode::FogBoundary) as i32, 7);
    }

    #[test]
    fn translated_setters_mirror_texture_setters() {
        for i in 0..6 {
            assert_eq!(
                blend_setter(BlendMode::ALL[i]),
                blend_setter(BlendMode::ALL[i + 6]),
                "{:?}",
                BlendMode::ALL[i]
            );
        }
    }

    #[test]
    fn fill_setters_follow_opaque_add_sub_revsub_srccolor() {
        let expected = [
            BlendSetter::Opaque,
            BlendSetter::AddClamp,
            BlendSetter::SubClamp,
            BlendSetter::RevSubClamp,
            BlendSetter::AddSrcColor,
        ];
        for (mode, setter) in BlendMode::ALL[16..21].iter().zip(expected) {
            assert_eq!(blend_setter(*mode), setter, "{mode:?}");
        }
        assert_eq!(blend_setter(BlendMode::Fuzz), BlendSetter::Shaded);
        assert_eq!(blend_setter(BlendMode::Stencil), BlendSetter::Shaded);
        assert_eq!(blend_setter(BlendMode::AddStencil), BlendSetter::AddClampShaded);
    }

    #[test]
    fn texture_add_at_full_combined_alpha_uses_inverse_constant_alpha() {
        let state = blend_setter(BlendMode::TextureAdd).state(128, 127);
        assert!(state.enabled);
        assert_eq!(state.equation, glow::FUNC_ADD);
        assert_eq!(state.src, glow::CONSTANT_ALPHA);
        assert_eq!(state.dst, glow::ONE_MINUS_CONSTANT_ALPHA, "128 + 127 == 255");
        let d = 127.0 / 256.0;
        assert_eq!(state.color, Some([d, d, d, 128.0 / 256.0]));
    }

    #[test]
    fn texture_add_below_full_combined_alpha_uses_constant_color() {
        let state = blend_setter(BlendMode::TextureAdd).state(128, 126);
        assert_eq!(state.src, glow::CONSTANT_ALPHA);
        assert_eq!(state.dst, glow::CONSTANT_COLOR, "128 + 126 < 255");
        let d = 126.0 / 256.0;
        assert_eq!(state.color, Some([d, d, d, 128.0 / 256.0]));
    }

    #[test]
    fn huge_source_alpha_does_not_overflow() {
        let state = alpha_blend_func(glow::FUNC_ADD, u32::MAX, 100);
        assert_eq!(state.src, glow::CONSTANT_ALPHA);
        assert_eq!(state.dst, glow::ONE_MINUS_CONSTANT_ALPHA);
    }

    #[test]
    fn alpha_factors_saturate_at_zero_and_full() {
        let state = alpha_blend_func(glow::FUNC_SUBTRACT, 255, 0);
        assert_eq!((state.src, state.dst), (glow::ONE, glow::ZERO));
        assert_eq!(state.equation, glow::FUNC_SUBTRACT);

        let state = alpha_blend_func(glow::FUNC_ADD, 0, 255);
        assert_eq!((state.src, state.dst), (glow::ZERO, glow::ONE));

        let state = alpha_blend_func(glow::FUNC_ADD, 200, 100);
        assert_eq!(state.dst, glow::ONE_MINUS_CONSTANT_ALPHA, "200 + 100 >= 255");
    }

    #[test]
    fn opaque_disables_and_masked_premultiplies() {
        assert!(!BlendSetter::Opaque.state(255, 0).enabled);
        let masked = BlendSetter::Masked.state(0, 0);
        assert_eq!((masked.src, masked.dst), (glow::ONE, glow::ONE_MINUS_SRC_ALPHA));
        let add = BlendSetter::AddClampShaded.state(0, 0);
        assert_eq!((add.src, add.dst), (glow::ONE, glow::ONE));
        let src_color = BlendSetter::AddSrcColor.state(0, 0);
        assert_eq!(
            (src_color.src, src_color.dst),
            (glow::SRC_COLOR, glow::ONE_MINUS_SRC_COLOR)
        );
    }
}
