//! Interpreted adapter: custom functions written in lamina script.
//!
//! A source file is compiled once at load time; the handle keeps the
//! compiled program and the resolved entry point. All handles of one adapter
//! share a single interpreter, so invocations are serialized on its lock
//! while unrelated backends keep running.

use std::fmt;
use std::sync::Arc;

use lamina_ir::{Contract, FunctionReference, Invocation, RawOutput};
use lamina_script::{FunctionRef, Interpreter, Program, Value};
use parking_lot::Mutex;

use crate::adapter::LanguageAdapter;
use crate::{BridgeError, CancelToken};

#[derive(Clone)]
pub struct InterpretedAdapter {
    interpreter: Arc<Mutex<Interpreter>>,
}

impl fmt::Debug for InterpretedAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterpretedAdapter").finish_non_exhaustive()
    }
}

pub struct InterpretedHandle {
    program: Arc<Program>,
    entry: FunctionRef,
    arity: usize,
    layers: bool,
}

impl InterpretedAdapter {
    pub fn new(max_call_depth: usize) -> Self {
        InterpretedAdapter {
            interpreter: Arc::new(Mutex::new(Interpreter::with_max_depth(max_call_depth))),
        }
    }
}

impl LanguageAdapter for InterpretedAdapter {
    type Handle = InterpretedHandle;

    fn load(
        &self,
        reference: &FunctionReference,
        contract: &Contract,
    ) -> Result<InterpretedHandle, BridgeError> {
        let (program, entry) = compile_entry(reference)?;
        let arity = program.arity(entry);
        if arity != contract.arity {
            return Err(BridgeError::signature(format!(
                "`{}` takes {arity} argument(s), expected {}",
                reference.locator.entry(),
                contract.arity
            )));
        }
        tracing::debug!(function = %reference.id, entry = reference.locator.entry(), "compiled script");
        Ok(InterpretedHandle {
            program: Arc::new(program),
            entry,
            arity,
            layers: contract.returns_scalar,
        })
    }

    fn invoke(
        &self,
        handle: &InterpretedHandle,
        call: &Invocation<'_>,
        _cancel: &CancelToken,
    ) -> Result<RawOutput, BridgeError> {
        let args = script_args(call, handle.arity).ok_or_else(|| {
            BridgeError::invocation(format!("unsupported entry arity {}", handle.arity))
        })?;
        let value = self
            .interpreter
            .lock()
            .call(&handle.program, handle.entry, args)
            .map_err(|err| BridgeError::invocation(err.to_string()))?;
        decode_result(&value, handle.layers).map_err(BridgeError::Invocation)
    }

    fn release(&self, handle: &InterpretedHandle) {
        tracing::trace!(entry = handle.program.name(handle.entry), "released script handle");
    }
}

/// Read and compile the source of `reference`, resolving its entry point.
pub(crate) fn compile_entry(
    reference: &FunctionReference,
) -> Result<(Program, FunctionRef), BridgeError> {
    let path = reference.locator.path();
    let source = std::fs::read_to_string(&path)
        .map_err(|err| BridgeError::load(format!("cannot read {}: {err}", path.display())))?;
    let program = lamina_script::compile(&source)
        .map_err(|err| BridgeError::load(format!("{}: {err}", path.display())))?;
    let entry_name = reference.locator.entry();
    let entry = program.lookup(entry_name).ok_or_else(|| {
        BridgeError::load(format!(
            "`{entry_name}` is not defined in {}",
            path.display()
        ))
    })?;
    Ok((program, entry))
}

/// Script arguments for an entry point of the given arity.
///
/// XY functions take `(x, params)`; layer functions take
/// `(params, bulk_in, bulk_out, contrast)` plus `domain` when they declare
/// five parameters.
pub(crate) fn script_args(call: &Invocation<'_>, arity: usize) -> Option<Vec<Value>> {
    let params = Value::numbers(call.params);
    #[expect(clippy::cast_precision_loss, reason = "indices are small")]
    let index = |i: usize| Value::Number(i as f64);
    match arity {
        2 => Some(vec![Value::numbers(call.x), params]),
        4 | 5 => {
            let mut args = vec![
                params,
                Value::numbers(call.bulk_in),
                Value::numbers(call.bulk_out),
                index(call.contrast),
            ];
            if arity == 5 {
                args.push(call.domain.map_or(Value::Void, index));
            }
            Some(args)
        }
        _ => None,
    }
}

/// Decode a script return value.
///
/// Layer functions return `[rows, substrate_roughness]` where `rows` is a
/// list of equally long number lists; XY functions return a number list.
pub(crate) fn decode_result(value: &Value, layers: bool) -> Result<RawOutput, String> {
    if !layers {
        let mut values = Vec::new();
        if value.as_list().is_none() || !value.flatten_numbers(&mut values) {
            return Err(format!("expected a list of numbers, got {value}"));
        }
        return Ok(RawOutput::new(values, 1));
    }

    let malformed = || format!("expected [rows, substrate_roughness], got {value}");
    let [rows, scalar] = value.as_list().ok_or_else(malformed)? else {
        return Err(malformed());
    };
    let rows = rows.as_list().ok_or_else(malformed)?;
    let scalar = scalar.as_number().ok_or_else(malformed)?;

    let columns = rows.first().and_then(Value::as_list).map_or(0, <[Value]>::len);
    let mut values = Vec::with_capacity(rows.len() * columns);
    for (i, row) in rows.iter().enumerate() {
        let ok = row.as_list().is_some_and(|cells| cells.len() == columns)
            && row.flatten_numbers(&mut values);
        if !ok {
            return Err(format!("layer row {i} is not a list of {columns} numbers: {row}"));
        }
    }
    Ok(RawOutput::new(values, columns).with_scalar(scalar))
}
