//! Per-type injection metadata.
//!
//! Each [`Injectable`] type declares its injection points once, through
//! [`Declarations`]. The result is validated and stored in the process-wide
//! [`MetadataRegistry`], keyed by `TypeId`.

use std::any::{type_name, TypeId};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;

use super::{Injection, InjectionSpec};
use crate::di::Injectable;
use crate::error::DeclarationError;

static REGISTRY: Lazy<MetadataRegistry> = Lazy::new(MetadataRegistry::new);

/// Where an injection is declared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InjectionPoint {
    /// A constructor (`method: None`) or method parameter.
    Parameter {
        method: Option<String>,
        index: usize,
    },
    Property {
        name: String,
        is_static: bool,
    },
    /// A method as a whole; not an injection target.
    Method { name: String },
}

/// Collects the injection points of one type.
pub struct Declarations {
    target: &'static str,
    parameters: HashMap<Option<String>, BTreeMap<usize, Injection>>,
    properties: Vec<Injection>,
}

impl Declarations {
    pub fn new(target: &'static str) -> Self {
        Self {
            target,
            parameters: HashMap::new(),
            properties: Vec::new(),
        }
    }

    pub fn target(&self) -> &'static str {
        self.target
    }

    /// Declares constructor parameter `index`.
    pub fn parameter(
        &mut self,
        index: usize,
        spec: InjectionSpec,
    ) -> Result<&mut Self, DeclarationError> {
        self.inject(InjectionPoint::Parameter { method: None, index }, spec)
    }

    /// Declares parameter `index` of `method`.
    pub fn method_parameter(
        &mut self,
        method: impl Into<String>,
        index: usize,
        spec: InjectionSpec,
    ) -> Result<&mut Self, DeclarationError> {
        self.inject(
            InjectionPoint::Parameter {
                method: Some(method.into()),
                index,
            },
            spec,
        )
    }

    /// Declares an instance property.
    pub fn property(
        &mut self,
        name: impl Into<String>,
        spec: InjectionSpec,
    ) -> Result<&mut Self, DeclarationError> {
        self.inject(
            InjectionPoint::Property {
                name: name.into(),
                is_static: false,
            },
            spec,
        )
    }

    /// Declares an injection at any point.
    pub fn inject(
        &mut self,
        point: InjectionPoint,
        spec: InjectionSpec,
    ) -> Result<&mut Self, DeclarationError> {
        let target = self.target;
        match point {
            InjectionPoint::Parameter { method, index } => {
                let params = self.parameters.entry(method.clone()).or_default();
                if params.contains_key(&index) {
                    let member = method.as_deref().unwrap_or("constructor");
                    return Err(DeclarationError::DuplicateInjection {
                        target,
                        member: format!("{member}[{index}]"),
                    });
                }
                params.insert(
                    index,
                    Injection {
                        target,
                        member: method,
                        parameter_index: Some(index),
                        binding_key: spec.binding_key,
                        metadata: spec.metadata,
                        resolve: spec.resolve,
                    },
                );
            }
            InjectionPoint::Property {
                name,
                is_static: true,
            } => {
                return Err(DeclarationError::StaticProperty {
                    target,
                    property: name,
                });
            }
            InjectionPoint::Property { name, .. } => {
                if self
                    .properties
                    .iter()
                    .any(|p| p.member.as_deref() == Some(name.as_str()))
                {
                    return Err(DeclarationError::DuplicateInjection {
                        target,
                        member: name,
                    });
                }
                self.properties.push(Injection {
                    target,
                    member: Some(name),
                    parameter_index: None,
                    binding_key: spec.binding_key,
                    metadata: spec.metadata,
                    resolve: spec.resolve,
                });
            }
            InjectionPoint::Method { name } => {
                return Err(DeclarationError::MethodNotInjectable {
                    target,
                    method: name,
                });
            }
        }
        Ok(self)
    }

    /// Validates that every parameter list is contiguous from 0.
    fn finish(self) -> Result<TypeInjections, DeclarationError> {
        let target = self.target;
        let mut parameters = HashMap::with_capacity(self.parameters.len());
        for (method, params) in self.parameters {
            if let Some(index) = (0..params.len()).find(|i| !params.contains_key(i)) {
                return Err(DeclarationError::ParameterGap {
                    target,
                    member: method.unwrap_or_else(|| "constructor".to_string()),
                    index,
                });
            }
            parameters.insert(method, params.into_values().map(Arc::new).collect());
        }
        Ok(TypeInjections {
            target,
            parameters,
            properties: self.properties.into_iter().map(Arc::new).collect(),
        })
    }
}

/// Validated injection metadata of one type.
#[derive(Debug)]
pub struct TypeInjections {
    target: &'static str,
    parameters: HashMap<Option<String>, Vec<Arc<Injection>>>,
    properties: Vec<Arc<Injection>>,
}

impl TypeInjections {
    pub fn target(&self) -> &'static str {
        self.target
    }

    /// Parameter injections of the constructor (`None`) or a method, by index.
    pub fn arguments(&self, method: Option<&str>) -> &[Arc<Injection>] {
        self.parameters
            .get(&method.map(str::to_string))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Property injections in declaration order.
    pub fn properties(&self) -> &[Arc<Injection>] {
        &self.properties
    }
}

/// Process-wide store of injection metadata.
#[derive(Default)]
pub struct MetadataRegistry {
    types: RwLock<HashMap<TypeId, Arc<TypeInjections>>>,
}

impl MetadataRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn global() -> &'static MetadataRegistry {
        &REGISTRY
    }

    /// Returns the metadata of `T`, declaring it on first use.
    pub fn ensure_declared<T: Injectable>(&self) -> Result<Arc<TypeInjections>, DeclarationError> {
        let id = TypeId::of::<T>();
        if let Some(found) = self.types.read().get(&id) {
            return Ok(found.clone());
        }

        let mut decl = Declarations::new(type_name::<T>());
        T::declare(&mut decl)?;
        let declared = Arc::new(decl.finish()?);
        tracing::trace!(target_type = declared.target(), "declared injections");

        // Two threads may race to declare the same type; the first one wins.
        Ok(self.types.write().entry(id).or_insert(declared).clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inject;

    fn decl() -> Declarations {
        Declarations::new("app::Service")
    }

    #[test]
    fn test_parameters_are_ordered_by_index() {
        let mut d = decl();
        d.parameter(1, inject::key("b"))
            .unwrap()
            .parameter(0, inject::key("a"))
            .unwrap();
        let declared = d.finish().unwrap();
        let keys: Vec<&str> = declared
            .arguments(None)
            .iter()
            .map(|i| i.binding_key.as_str())
            .collect();
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[test]
    fn test_method_parameters_are_separate() {
        let mut d = decl();
        d.parameter(0, inject::key("a")).unwrap();
        d.method_parameter("greet", 0, inject::key("b")).unwrap();
        let declared = d.finish().unwrap();
        assert_eq!(declared.arguments(None).len(), 1);
        assert_eq!(declared.arguments(Some("greet"))[0].binding_key, "b");
        assert!(declared.arguments(Some("other")).is_empty());
    }

    #[test]
    fn test_duplicate_parameter() {
        let mut d = decl();
        d.parameter(0, inject::key("a")).unwrap();
        let err = d.parameter(0, inject::key("b")).err().unwrap();
        assert_eq!(
            err,
            DeclarationError::DuplicateInjection {
                target: "app::Service",
                member: "constructor[0]".into()
            }
        );
    }

    #[test]
    fn test_duplicate_property() {
        let mut d = decl();
        d.property("p", inject::key("a")).unwrap();
        assert!(matches!(
            d.property("p", inject::key("b")),
            Err(DeclarationError::DuplicateInjection { .. })
        ));
    }

    #[test]
    fn test_static_property_rejected() {
        let err = decl()
            .inject(
                InjectionPoint::Property {
                    name: "shared".into(),
                    is_static: true,
                },
                inject::key("a"),
            )
            .err()
            .unwrap();
        assert!(matches!(err, DeclarationError::StaticProperty { property, .. } if property == "shared"));
    }

    #[test]
    fn test_method_rejected() {
        let err = decl()
            .inject(
                InjectionPoint::Method {
                    name: "run".into(),
                },
                inject::key("a"),
            )
            .err()
            .unwrap();
        assert!(matches!(err, DeclarationError::MethodNotInjectable { method, .. } if method == "run"));
    }

    #[test]
    fn test_parameter_gap() {
        let mut d = decl();
        d.parameter(0, inject::key("a"))
            .unwrap()
            .parameter(2, inject::key("c"))
            .unwrap();
        assert_eq!(
            d.finish().err(),
            Some(DeclarationError::ParameterGap {
                target: "app::Service",
                member: "constructor".into(),
                index: 1
            })
        );
    }

    #[test]
    fn test_properties_keep_declaration_order() {
        let mut d = decl();
        d.property("z", inject::key("z")).unwrap();
        d.property("a", inject::key("a")).unwrap();
        let declared = d.finish().unwrap();
        let names: Vec<&str> = declared
            .properties()
            .iter()
            .filter_map(|i| i.member.as_deref())
            .collect();
        assert_eq!(names, vec!["z", "a"]);
    }
}
