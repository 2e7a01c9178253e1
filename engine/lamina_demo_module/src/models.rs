//! The demo models as plain Rust functions.
//!
//! Layer models return rows of `[thickness, sld, roughness]` and the
//! substrate roughness as the scalar; XY models return one SLD per grid
//! point. `None` means the arguments do not fit the model.

use lamina_abi::{CallArgs, ModuleOutput};

/// Number of sublayers in [`graded_film`].
pub const GRADED_STEPS: usize = 120;

/// `sld(x) = p0 + p1 * x`.
pub fn linear_xy(args: &CallArgs<'_>) -> Option<ModuleOutput> {
    let [offset, slope] = *args.params else {
        return None;
    };
    Some(ModuleOutput {
        values: args.x.iter().map(|x| offset + slope * x).collect(),
        scalar: None,
    })
}

/// Smooth step from `p0` to `p1` centred at `p2` with width `p3`.
pub fn sld_tanh(args: &CallArgs<'_>) -> Option<ModuleOutput> {
    let [from, to, centre, width, ..] = *args.params else {
        return None;
    };
    if width == 0.0 {
        return None;
    }
    Some(ModuleOutput {
        values: args
            .x
            .iter()
            .map(|x| from + (to - from) * 0.5 * (1.0 + ((x - centre) / width).tanh()))
            .collect(),
        scalar: None,
    })
}

/// Oxide under a solvent-penetrated film.
///
/// Params: oxide thickness, oxide SLD, film thickness, film SLD, roughness.
/// The film holds 10% of the contrast's bulk-out solvent.
pub fn oxide_bilayer(args: &CallArgs<'_>) -> Option<ModuleOutput> {
    let [oxide_thick, oxide_sld, film_thick, film_sld, roughness] = *args.params else {
        return None;
    };
    let solvent = *args.bulk_out.get(args.contrast)?;
    let film = 0.9 * film_sld + 0.1 * solvent;
    Some(ModuleOutput {
        values: vec![
            oxide_thick, oxide_sld, roughness, //
            film_thick, film, roughness,
        ],
        scalar: Some(roughness),
    })
}

/// A film whose SLD grades linearly into the bulk-out solvent over
/// [`GRADED_STEPS`] sublayers.
///
/// Params: total thickness, film SLD, roughness.
pub fn graded_film(args: &CallArgs<'_>) -> Option<ModuleOutput> {
    let [thickness, sld, roughness] = *args.params else {
        return None;
    };
    let solvent = *args.bulk_out.get(args.contrast)?;
    #[expect(clippy::cast_precision_loss, reason = "step count is small")]
    let steps = GRADED_STEPS as f64;
    let mut values = Vec::with_capacity(GRADED_STEPS * 3);
    for step in 0..GRADED_STEPS {
        #[expect(clippy::cast_precision_loss, reason = "step index is small")]
        let fraction = (step as f64 + 0.5) / steps;
        values.extend([thickness / steps, sld + (solvent - sld) * fraction, roughness]);
    }
    Some(ModuleOutput {
        values,
        scalar: Some(roughness),
    })
}

/// Slab with a hydration column: `[thickness, sld, roughness, hydration]`.
pub fn hydrated_slab(args: &CallArgs<'_>) -> Option<ModuleOutput> {
    let [thickness, sld, roughness, hydration] = *args.params else {
        return None;
    };
    Some(ModuleOutput {
        values: vec![thickness, sld, roughness, hydration],
        scalar: Some(roughness),
    })
}

/// One layer from the first three params, scaled by the one-based contrast.
pub fn scaled_params(args: &CallArgs<'_>) -> Option<ModuleOutput> {
    let [a, b, c, ..] = *args.params else {
        return None;
    };
    #[expect(clippy::cast_precision_loss, reason = "contrast indices are small")]
    let scale = (args.contrast + 1) as f64;
    Some(ModuleOutput {
        values: vec![a * scale, b * scale, c * scale],
        scalar: Some(c),
    })
}

/// Always reports failure.
pub fn failing(_: &CallArgs<'_>) -> Option<ModuleOutput> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args<'a>(params: &'a [f64], bulk_out: &'a [f64], x: &'a [f64]) -> CallArgs<'a> {
        CallArgs {
            params,
            bulk_in: &[],
            bulk_out,
            x,
            contrast: 0,
            domain: None,
        }
    }

    #[test]
    fn linear_xy_follows_the_grid() {
        let out = linear_xy(&args(&[1.0, 2.0], &[], &[0.0, 1.0, 2.0]));
        assert_eq!(out.map(|o| o.values), Some(vec![1.0, 3.0, 5.0]));
        assert!(linear_xy(&args(&[1.0], &[], &[0.0])).is_none());
    }

    #[test]
    fn tanh_is_centred() {
        let out = sld_tanh(&args(&[0.0, 2.0, 5.0, 1.0], &[], &[5.0])).map(|o| o.values);
        assert_eq!(out, Some(vec![1.0]));
        assert!(sld_tanh(&args(&[0.0, 2.0, 5.0, 0.0], &[], &[5.0])).is_none());
    }

    #[test]
    fn bilayer_mixes_in_solvent() {
        let out = oxide_bilayer(&args(&[15.0, 3.4, 40.0, 1.0, 3.0], &[6.35], &[]));
        let out = out.unwrap_or_default();
        assert_eq!(out.values.len(), 6);
        assert!((out.values[4] - (0.9 + 0.635)).abs() < 1e-12);
        assert_eq!(out.scalar, Some(3.0));

        // Contrast without a bulk-out value.
        assert!(oxide_bilayer(&args(&[15.0, 3.4, 40.0, 1.0, 3.0], &[], &[])).is_none());
    }

    #[test]
    fn graded_film_has_fixed_step_count() {
        let out = graded_film(&args(&[120.0, 2.0, 4.0], &[6.0], &[])).unwrap_or_default();
        assert_eq!(out.values.len(), GRADED_STEPS * 3);
        assert!((out.values[0] - 1.0).abs() < 1e-12);
        assert!(out.values[1] > 2.0 && out.values[1] < 6.0);
    }
}
