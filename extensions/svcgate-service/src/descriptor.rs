use crate::definition::{DeclaredReturn, MethodSignature, ServiceDefinition};
use crate::error::ClientError;
use crate::error_mapper::ErrorMapper;
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::sync::Arc;
use svcgate::utils::method_id_hash;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReturnShape {
    Single,
    Stream,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommunicationPattern {
    RequestResponse,
    RequestStream,
    FireAndForget,
}

impl ReturnShape {
    pub fn pattern(self) -> CommunicationPattern {
        match self {
            ReturnShape::Single => CommunicationPattern::RequestResponse,
            ReturnShape::Stream => CommunicationPattern::RequestStream,
            ReturnShape::None => CommunicationPattern::FireAndForget,
        }
    }
}

/// Classified metadata for a single service method.
#[derive(Debug, Clone)]
pub struct MethodDescriptor {
    pub name: &'static str,
    pub qualifier: String,
    /// xxh3 hash of `qualifier`.
    pub method_id: u64,
    pub parameter_types: Vec<&'static str>,
    pub return_shape: ReturnShape,
    pub pattern: CommunicationPattern,
    pub error_mapper_override: Option<Arc<dyn ErrorMapper>>,
}

/// Every method of one service, classified once and then read-only.
#[derive(Debug, Clone)]
pub struct MethodDescriptorTable {
    service: &'static str,
    namespace: &'static str,
    methods: BTreeMap<&'static str, MethodDescriptor>,
}

impl MethodDescriptorTable {
    pub fn build<S: ServiceDefinition>() -> Result<Self, ClientError> {
        Self::from_signatures(std::any::type_name::<S>(), S::NAMESPACE, S::methods())
    }

    pub fn from_signatures(
        service: &'static str,
        namespace: &'static str,
        signatures: Vec<MethodSignature>,
    ) -> Result<Self, ClientError> {
        let invalid = |reason: String| ClientError::InvalidServiceDefinition {
            service: service.to_owned(),
            reason,
        };

        if namespace.is_empty() {
            return Err(invalid("namespace is empty".into()));
        }

        let mut methods = BTreeMap::new();
        let mut qualifiers = BTreeMap::new();

        for signature in signatures {
            if signature.name.is_empty() {
                return Err(invalid("method name is empty".into()));
            }

            let return_shape = match signature.declared_return {
                DeclaredReturn::Unit => ReturnShape::None,
                DeclaredReturn::Single(_) => ReturnShape::Single,
                DeclaredReturn::Stream(_) => ReturnShape::Stream,
                DeclaredReturn::Other(declared) => {
                    return Err(ClientError::UnclassifiableMethod {
                        service: service.to_owned(),
                        method: signature.name.to_owned(),
                        declared: declared.to_owned(),
                    });
                }
            };

            let qualifier = signature
                .qualifier
                .unwrap_or_else(|| format!("{namespace}/{}", signature.name));

            if let Some(existing) = qualifiers.insert(qualifier.clone(), signature.name) {
                return Err(invalid(format!(
                    "methods `{existing}` and `{}` share qualifier `{qualifier}`",
                    signature.name
                )));
            }

            let descriptor = MethodDescriptor {
                name: signature.name,
                method_id: method_id_hash(&qualifier),
                qualifier,
                parameter_types: signature.parameter_types,
                return_shape,
                pattern: return_shape.pattern(),
                error_mapper_override: signature.error_mapper,
            };

            match methods.entry(signature.name) {
                Entry::Vacant(slot) => {
                    slot.insert(descriptor);
                }
                Entry::Occupied(_) => {
                    return Err(invalid(format!(
                        "method `{}` is declared more than once",
                        signature.name
                    )));
                }
            }
        }

        tracing::trace!(
            "Classified {} method(s) of service `{}`",
            methods.len(),
            service
        );

        Ok(Self {
            service,
            namespace,
            methods,
        })
    }

    pub fn service(&self) -> &'static str {
        self.service
    }

    pub fn namespace(&self) -> &'static str {
        self.namespace
    }

    pub fn get(&self, name: &str) -> Option<&MethodDescriptor> {
        self.methods.get(name)
    }

    pub fn get_by_qualifier(&self, qualifier: &str) -> Option<&MethodDescriptor> {
        self.methods.values().find(|d| d.qualifier == qualifier)
    }

    /// Descriptors in method-name order.
    pub fn iter(&self) -> impl Iterator<Item = &MethodDescriptor> {
        self.methods.values()
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}
