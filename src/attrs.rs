//! # Attribute maps
//!
//! Node and mark attributes are kept as an ordered string → JSON-value map.
//! Values are compared structurally, which is what makes node and mark
//! equality structural as well.

use derivative::Derivative;
use displaydoc::Display;
use indexmap::IndexMap;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

/// An attribute map attached to a node or mark.
pub type Attrs = serde_json::Map<String, Value>;

/// Errors raised when validating attribute maps
#[derive(Debug, Clone, Error, Display, PartialEq, Eq)]
pub enum AttrError {
    /// No value supplied for required attribute `{attr}` of `{on}`
    MissingRequired {
        /// The attribute name
        attr: String,
        /// The node or mark type it belongs to
        on: String,
    },
    /// Unsupported attribute `{attr}` for `{on}`
    Unsupported {
        /// The attribute name
        attr: String,
        /// The node or mark type it was given for
        on: String,
    },
}

/// Describes a single attribute of a node or mark type.
///
/// An attribute is required exactly when it has neither a default value nor a
/// compute function.
#[derive(Derivative, Default)]
#[derivative(Debug)]
pub struct AttributeSpec {
    /// The value to use when none is supplied
    pub default: Option<Value>,
    /// Computes a fresh value when none is supplied
    #[derivative(Debug = "ignore")]
    pub compute: Option<Arc<dyn Fn() -> Value + Send + Sync>>,
}

impl AttributeSpec {
    /// An attribute that falls back to the given value
    pub fn with_default(value: Value) -> Self {
        AttributeSpec {
            default: Some(value),
            compute: None,
        }
    }

    /// An attribute that must always be supplied
    pub fn required() -> Self {
        AttributeSpec::default()
    }

    pub(crate) fn is_required(&self) -> bool {
        self.default.is_none() && self.compute.is_none()
    }
}

/// Fill in an attribute map for a type, applying defaults and rejecting both
/// missing required attributes and names the type does not declare.
pub(crate) fn compute_attrs(
    specs: &IndexMap<String, AttributeSpec>,
    given: Option<&Attrs>,
    on: &str,
) -> Result<Attrs, AttrError> {
    if let Some(given) = given {
        for name in given.keys() {
            if !specs.contains_key(name) {
                return Err(AttrError::Unsupported {
                    attr: name.clone(),
                    on: on.to_owned(),
                });
            }
        }
    }
    let mut built = Attrs::new();
    for (name, spec) in specs {
        let value = match given.and_then(|g| g.get(name)) {
            Some(value) => value.clone(),
            None => match (&spec.default, &spec.compute) {
                (Some(default), _) => default.clone(),
                (None, Some(compute)) => compute(),
                (None, None) => {
                    return Err(AttrError::MissingRequired {
                        attr: name.clone(),
                        on: on.to_owned(),
                    })
                }
            },
        };
        built.insert(name.clone(), value);
    }
    Ok(built)
}

/// The attribute object shared by all default instances of a type, or `None`
/// when some attribute is required.
pub(crate) fn default_attrs(specs: &IndexMap<String, AttributeSpec>) -> Option<Attrs> {
    let mut defaults = Attrs::new();
    for (name, spec) in specs {
        match (&spec.default, &spec.compute) {
            (Some(default), _) => {
                defaults.insert(name.clone(), default.clone());
            }
            (None, Some(compute)) => {
                defaults.insert(name.clone(), compute());
            }
            (None, None) => return None,
        }
    }
    Some(defaults)
}

#[cfg(test)]
mod tests {
    use super::{compute_attrs, default_attrs, AttrError, AttributeSpec};
    use indexmap::IndexMap;
    use serde_json::{json, Value};

    fn specs() -> IndexMap<String, AttributeSpec> {
        let mut specs = IndexMap::new();
        specs.insert("src".to_owned(), AttributeSpec::required());
        specs.insert(
            "title".to_owned(),
            AttributeSpec::with_default(Value::Null),
        );
        specs
    }

    fn obj(value: Value) -> super::Attrs {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    #[test]
    fn fills_defaults() {
        let computed = compute_attrs(&specs(), Some(&obj(json!({"src": "x.png"}))), "image");
        assert_eq!(computed, Ok(obj(json!({"src": "x.png", "title": null}))));
    }

    #[test]
    fn rejects_missing_required() {
        assert_eq!(
            compute_attrs(&specs(), None, "image"),
            Err(AttrError::MissingRequired {
                attr: "src".to_owned(),
                on: "image".to_owned()
            })
        );
    }

    #[test]
    fn rejects_unknown_names() {
        let given = obj(json!({"src": "x.png", "widht": 10}));
        assert_eq!(
            compute_attrs(&specs(), Some(&given), "image"),
            Err(AttrError::Unsupported {
                attr: "widht".to_owned(),
                on: "image".to_owned()
            })
        );
    }

    #[test]
    fn default_attrs_requires_all_defaults() {
        assert_eq!(default_attrs(&specs()), None);
        let mut all_default = IndexMap::new();
        all_default.insert("tight".to_owned(), AttributeSpec::with_default(json!(false)));
        assert_eq!(default_attrs(&all_default), Some(obj(json!({"tight": false}))));
    }
}
