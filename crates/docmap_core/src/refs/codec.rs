//! The field codec for reference values.

use crate::codec::{DecodeContext, EncodeContext, ValueCodec};
use crate::error::{CoreResult, MappingError};
use crate::refs::{RawIds, RefSeed};
use crate::spec::{RefShape, ReferenceSpec};
use docmap_document::Value;
use std::any::Any;

/// Converts a reference field between its stored identifier form and the
/// in-memory wrapper type.
///
/// Decoding builds an unresolved wrapper around the raw identifiers; with
/// eager mode (the default) the wrapper is resolved before the owning
/// entity's decode returns. Encoding delegates to the wrapper's own
/// minimal-identifier encode path.
pub(crate) struct ReferenceCodec {
    spec: ReferenceSpec,
}

impl ReferenceCodec {
    pub(crate) fn new(spec: ReferenceSpec) -> Self {
        Self { spec }
    }
}

impl ValueCodec for ReferenceCodec {
    fn encode(&self, value: &dyn Any, ctx: &EncodeContext<'_>) -> CoreResult<Value> {
        let reference = (self.spec.as_reference)(value).ok_or_else(|| {
            MappingError::type_mismatch(self.spec.target.name(), "reference encode")
        })?;
        reference.encode(ctx)
    }

    fn decode(&self, value: &Value, ctx: &DecodeContext<'_>) -> CoreResult<Box<dyn Any>> {
        let ids = match self.spec.shape {
            RefShape::Single => RawIds::One(value.clone()),
            RefShape::List | RefShape::Set => {
                let items = value.as_array().ok_or_else(|| {
                    MappingError::invalid_value(
                        self.spec.target.name(),
                        "array of identifiers",
                        value.type_name(),
                    )
                })?;
                RawIds::Many(items.to_vec())
            }
            RefShape::Map => {
                let doc = value.as_document().ok_or_else(|| {
                    MappingError::invalid_value(
                        self.spec.target.name(),
                        "document of identifiers",
                        value.type_name(),
                    )
                })?;
                RawIds::Keyed(
                    doc.iter()
                        .map(|(k, v)| (k.to_string(), v.clone()))
                        .collect(),
                )
            }
        };

        let seed = RefSeed {
            datastore: ctx.datastore().clone(),
            target: self.spec.target,
            ids,
            ignore_missing: self.spec.ignore_missing,
        };
        let wrapped = (self.spec.wrap)(seed)?;

        if !self.spec.lazy {
            let reference = (self.spec.as_reference)(&*wrapped).ok_or_else(|| {
                MappingError::type_mismatch(self.spec.target.name(), "reference decode")
            })?;
            reference.resolve()?;
        }
        Ok(wrapped)
    }
}
