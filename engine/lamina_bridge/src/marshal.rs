//! Decoding of adapter output into per-contrast results.
//!
//! Layer tables become a depth profile: one point per layer at the depth of
//! its top interface, valued at the layer's SLD. XY output is paired with the
//! project's depth grid as is.

use lamina_ir::{Contract, ContrastOutput, FunctionId, LayerTable, ModelKind, Profile, RawOutput};

use crate::BridgeError;

/// Column holding layer thickness.
const THICKNESS: usize = 0;
/// Column holding layer SLD.
const SLD: usize = 1;

pub(crate) fn decode(
    model: &ModelKind,
    contract: &Contract,
    function: FunctionId,
    contrast: usize,
    raw: RawOutput,
) -> Result<ContrastOutput, BridgeError> {
    match model {
        ModelKind::CustomLayers { .. } => decode_layers(contract, function, contrast, raw),
        ModelKind::CustomXY { x } => decode_xy(x, function, contrast, raw),
    }
}

fn decode_layers(
    contract: &Contract,
    function: FunctionId,
    contrast: usize,
    raw: RawOutput,
) -> Result<ContrastOutput, BridgeError> {
    let columns = contract.columns;
    if columns <= SLD {
        return Err(BridgeError::invocation(format!(
            "layer rows need thickness and SLD columns, contract has {columns}"
        )));
    }
    // An empty table carries no row width.
    if raw.columns != columns && !raw.values.is_empty() {
        return Err(BridgeError::invocation(format!(
            "layer rows have {} column(s), expected {columns}",
            raw.columns
        )));
    }
    if raw.values.len() % columns != 0 {
        return Err(BridgeError::invocation(format!(
            "{} values do not form rows of {columns}",
            raw.values.len()
        )));
    }
    let scalar = raw
        .scalar
        .ok_or_else(|| BridgeError::invocation("layer function returned no substrate roughness"))?;

    let table = LayerTable {
        columns,
        values: raw.values,
    };
    let mut depth = 0.0;
    let mut profile = Profile::default();
    for row in table.rows() {
        profile.x.push(depth);
        profile.y.push(row[SLD]);
        depth += row[THICKNESS];
    }
    tracing::trace!(%function, contrast, layers = table.row_count(), "decoded layers");

    Ok(ContrastOutput {
        function,
        contrast,
        profile,
        layers: Some(table),
        substrate_roughness: Some(scalar),
    })
}

fn decode_xy(
    x: &[f64],
    function: FunctionId,
    contrast: usize,
    raw: RawOutput,
) -> Result<ContrastOutput, BridgeError> {
    if raw.columns > 1 {
        return Err(BridgeError::invocation(format!(
            "XY function returned {} columns, expected 1",
            raw.columns
        )));
    }
    if raw.values.len() != x.len() {
        return Err(BridgeError::invocation(format!(
            "XY function returned {} values for a grid of {}",
            raw.values.len(),
            x.len()
        )));
    }
    Ok(ContrastOutput {
        function,
        contrast,
        profile: Profile {
            x: x.to_vec(),
            y: raw.values,
        },
        layers: None,
        substrate_roughness: raw.scalar,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn layers() -> (ModelKind, Contract) {
        let model = ModelKind::layers();
        let contract = Contract::for_model(&model, 3, false);
        (model, contract)
    }

    #[test]
    fn layer_profile_steps_down_in_depth() {
        let (model, contract) = layers();
        let raw = RawOutput::new(vec![10.0, 1.0, 3.0, 25.0, 4.5, 2.0], 3).with_scalar(3.0);
        let out = decode(&model, &contract, FunctionId(1), 0, raw).unwrap_or_else(|e| panic!("{e}"));

        assert_eq!(out.profile.x, vec![0.0, 10.0]);
        assert_eq!(out.profile.y, vec![1.0, 4.5]);
        assert_eq!(out.substrate_roughness, Some(3.0));
        assert_eq!(out.layers.map(|t| t.row_count()), Some(2));
        assert_eq!(out.function, FunctionId(1));
    }

    #[test]
    fn empty_layer_table_is_accepted() {
        let (model, contract) = layers();
        let raw = RawOutput::new(Vec::new(), 0).with_scalar(1.0);
        let out = decode(&model, &contract, FunctionId(0), 0, raw).unwrap_or_else(|e| panic!("{e}"));
        assert!(out.profile.is_empty());
    }

    #[test]
    fn malformed_layers_are_invocation_errors() {
        let (model, contract) = layers();
        let wrong_columns = RawOutput::new(vec![1.0, 2.0, 3.0, 4.0], 4).with_scalar(0.0);
        let ragged = RawOutput::new(vec![1.0, 2.0, 3.0, 4.0], 3).with_scalar(0.0);
        let no_scalar = RawOutput::new(vec![1.0, 2.0, 3.0], 3);
        for raw in [wrong_columns, ragged, no_scalar] {
            assert!(matches!(
                decode(&model, &contract, FunctionId(0), 0, raw),
                Err(BridgeError::Invocation(_))
            ));
        }
    }

    #[test]
    fn xy_output_pairs_with_the_grid() {
        let model = ModelKind::xy(vec![0.0, 5.0, 10.0]);
        let contract = Contract::for_model(&model, 2, false);
        let raw = RawOutput::new(vec![2.0, 3.0, 4.0], 1);
        let out = decode(&model, &contract, FunctionId(0), 2, raw).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(
            out.profile.points().collect::<Vec<_>>(),
            vec![(0.0, 2.0), (5.0, 3.0), (10.0, 4.0)]
        );
        assert_eq!(out.layers, None);
        assert_eq!(out.contrast, 2);

        let short = RawOutput::new(vec![2.0], 1);
        assert!(decode(&model, &contract, FunctionId(0), 0, short).is_err());
    }
}
