use log::warn;

use crate::{Entity, error::AccessError, meta::AttributeDescriptor, value::Value};

/// Reads one attribute off `sample`.
///
/// A field of that name wins over a getter. Unset values and zero values come
/// back as `Ok(None)`; an attribute with neither field nor getter is an error.
pub fn extract<T: Entity>(
    sample: &T,
    descriptor: &AttributeDescriptor,
) -> Result<Option<Value>, AccessError> {
    let value = match sample.read_field(descriptor.level, descriptor.name) {
        Err(AccessError::NoSuchField { .. }) => {
            sample.call_getter(descriptor.level, descriptor.name)?
        }
        other => other?,
    };
    Ok(value.filter(|v| !v.is_zero()))
}

/// Extracts every present value in attribute order, collecting access failures
/// instead of aborting on them.
pub fn extract_all<T: Entity>(
    sample: &T,
    attributes: &[AttributeDescriptor],
) -> (Vec<(AttributeDescriptor, Value)>, Vec<AccessError>) {
    let mut values = Vec::new();
    let mut diagnostics = Vec::new();
    for descriptor in attributes {
        match extract(sample, descriptor) {
            Ok(Some(value)) => values.push((descriptor.clone(), value)),
            Ok(None) => {}
            Err(err) => {
                warn!("attribute {} skipped: {}", descriptor.name, err);
                diagnostics.push(err);
            }
        }
    }
    (values, diagnostics)
}
