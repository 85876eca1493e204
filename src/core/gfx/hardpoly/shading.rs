//! CPU rendition of the scene fragment program's palette arithmetic.
//!
//! The GLSL in `shaders/scene.frag` is the source of truth at runtime; these
//! functions repeat its math step for step so the rounding and row
//! interpolation can be checked without a GL context.

use super::args::NUMCOLORMAPS;

/// Darkest colormap row.
pub const MAX_SHADE: f32 = (NUMCOLORMAPS - 1) as f32;

/// How fast the sky fades into the cap color near either end of the sky.
pub const SKYCAP_START_FADE: f32 = 4.0;

const GAMMA: f32 = 2.2;

/// Colormap row (0 brightest, 31 darkest) for a face `light` seen at
/// view-space depth `view_z` (negative in front of the camera).
///
/// Negative lights are fixed: `-light - 1` is the 0..=255 level and depth
/// plays no part.
pub fn software_light_pal(light: f32, glob_vis: f32, view_z: f32) -> f32 {
    if light < 0.0 {
        return MAX_SHADE - ((-1.0 - light) * MAX_SHADE / 255.0 + 0.5).trunc();
    }
    let z = -view_z;
    let vis = glob_vis / z;
    let shade = 64.0 - (light + 12.0) * 32.0 / 128.0;
    (shade - vis.min(24.0)).clamp(0.0, MAX_SHADE)
}

/// The two colormap rows blended for `lightscale` and the weight of the
/// second one.
pub fn shade_rows(lightscale: f32) -> (usize, usize, f32) {
    let light = (lightscale - 0.5).max(0.0);
    let row0 = light as usize;
    let row1 = (row0 + 1).min(NUMCOLORMAPS - 1);
    (row0, row1, light.fract())
}

/// Palette index stored in a normalized R8 texel.
#[inline(always)]
pub fn sample_index(r: f32) -> i32 {
    (r * 255.0 + 0.5) as i32
}

/// Unpacks an RGBA8 colormap texel into normalized channels.
#[inline(always)]
pub fn unpack_rgba(texel: u32) -> [f32; 4] {
    texel.to_le_bytes().map(|c| f32::from(c) / 255.0)
}

/// Blends two colors in linear space, treating both as gamma 2.2 encoded.
/// Alpha is blended as is.
pub fn gamma_mix(c0: [f32; 4], c1: [f32; 4], t: f32) -> [f32; 4] {
    let mut out = [0.0; 4];
    for i in 0..3 {
        let a = c0[i].powf(GAMMA);
        let b = c1[i].powf(GAMMA);
        out[i] = (a + (b - a) * t).powf(1.0 / GAMMA);
    }
    out[3] = c0[3] + (c1[3] - c0[3]) * t;
    out
}

/// Color of palette index `fg` at `lightscale`, read from a packed colormap
/// texture (`256 * NUMCOLORMAPS` texels, one row per shade).
pub fn light_shade_pal(colormap: &[u32], fg: i32, lightscale: f32) -> [f32; 4] {
    let (row0, row1, t) = shade_rows(lightscale);
    let column = fg.clamp(0, 255) as usize;
    let fetch = |row: usize| {
        colormap
            .get(row * 256 + column)
            .copied()
            .map_or([0.0; 4], unpack_rgba)
    };
    gamma_mix(fetch(row0), fetch(row1), t)
}

/// Weight of the sky texture against the cap color at vertical texture
/// coordinate `v`; the sky spans `0..=2` and fades out at both ends.
pub fn skycap_alpha(v: f32) -> f32 {
    let top = (v * SKYCAP_START_FADE).clamp(0.0, 1.0);
    let bottom = ((2.0 - v) * SKYCAP_START_FADE).clamp(0.0, 1.0);
    top.min(bottom)
}

/// Colormap row used by screen rects, which have no depth term.
pub fn rect_shade(light: f32) -> i32 {
    MAX_SHADE as i32 - (light * MAX_SHADE / 255.0 + 0.5) as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-4
    }

    #[test]
    fn fixed_light_ignores_depth() {
        // Encoded -(64) - 1.
        let near = software_light_pal(-65.0, 1638.4, -1.0);
        let far = software_light_pal(-65.0, 1638.4, -10_000.0);
        assert_eq!(near, far);
        assert_eq!(near, 23.0, "31 - round(64 * 31 / 255)");
        assert_eq!(software_light_pal(-256.0, 1638.4, -1.0), 0.0, "full bright");
        assert_eq!(software_light_pal(-1.0, 1638.4, -1.0), 31.0, "black");
    }

    #[test]
    fn distance_darkens_toward_the_shade_limit() {
        let near = software_light_pal(128.0, 1638.4, -100.0);
        let far = software_light_pal(128.0, 1638.4, -1000.0);
        assert!(far > near, "{far} should be darker than {near}");
        assert!(close(near, 29.0 - 16.384));
        assert!(close(far, 29.0 - 1.6384));
        // The visibility bonus caps at 24 rows.
        assert_eq!(software_light_pal(128.0, 1638.4, -1.0), 5.0);
    }

    #[test]
    fn light_scale_is_clamped_to_colormap_rows() {
        assert_eq!(software_light_pal(255.0, 0.0, -1.0), 0.0);
        assert_eq!(software_light_pal(0.0, 0.0, -1.0), MAX_SHADE);
    }

    #[test]
    fn rows_interpolate_half_a_row_late() {
        assert_eq!(shade_rows(0.0), (0, 1, 0.0));
        assert_eq!(shade_rows(10.5), (10, 11, 0.0));
        assert_eq!(shade_rows(10.75), (10, 11, 0.25));
        assert_eq!(shade_rows(31.0), (30, 31, 0.5));
    }

    #[test]
    fn index_extraction_rounds_to_nearest() {
        assert_eq!(sample_index(0.0), 0);
        assert_eq!(sample_index(1.0), 255);
        assert_eq!(sample_index(17.0 / 255.0), 17);
        assert_eq!(sample_index(17.49 / 255.0), 17);
        assert_eq!(sample_index(17.51 / 255.0), 18);
    }

    #[test]
    fn gamma_mix_keeps_endpoints_and_brightens_midpoint() {
        let black = [0.0, 0.0, 0.0, 1.0];
        let white = [1.0, 1.0, 1.0, 1.0];
        assert_eq!(gamma_mix(black, white, 0.0), black);
        assert_eq!(gamma_mix(black, white, 1.0), white);
        let mid = gamma_mix(black, white, 0.5);
        assert!(close(mid[0], 0.5f32.powf(1.0 / 2.2)));
        assert!(mid[0] > 0.5, "linear-space blending is brighter than sRGB blending");
    }

    #[test]
    fn light_shade_reads_the_selected_rows() {
        // Row r holds grey level r * 8 for every column.
        let colormap: Vec<u32> = (0..NUMCOLORMAPS)
            .flat_map(|row| {
                let g = (row * 8) as u32;
                std::iter::repeat_n(g | g << 8 | g << 16 | 0xFF << 24, 256)
            })
            .collect();
        let color = light_shade_pal(&colormap, 42, 10.5);
        assert!(close(color[0], 80.0 / 255.0));
        assert_eq!(color[3], 1.0);
    }

    #[test]
    fn skycap_fades_in_and_out() {
        let alphas: Vec<f32> = [0.0, 0.5, 1.0, 1.5, 2.0].map(skycap_alpha).to_vec();
        assert_eq!(alphas, [0.0, 1.0, 1.0, 1.0, 0.0]);
        assert_eq!(skycap_alpha(0.125), 0.5);
    }

    #[test]
    fn rect_shade_maps_full_light_to_row_zero() {
        assert_eq!(rect_shade(255.0), 0);
        assert_eq!(rect_shade(0.0), 31);
        assert_eq!(rect_shade(128.0), 15);
    }
}
