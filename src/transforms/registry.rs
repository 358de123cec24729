// Transform registry
//
// Maps transform names to constructors. Passed explicitly to whoever builds
// pipelines; there is no process-wide instance.

use super::derivative::DerivativeTransform;
use super::function::TransformFunction;
use super::integral::IntegralTransform;
use super::moving_average::MovingAverageTransform;
use super::outlier::OutlierRemovalTransform;
use super::quaternion::QuaternionToRpy;
use super::scale::ScaleTransform;
use super::types::{TransformError, TransformResult};
use std::collections::BTreeMap;

/// Builds a fresh transform instance
pub type TransformConstructor = Box<dyn Fn() -> Box<dyn TransformFunction> + Send + Sync>;

/// Factory for creating transforms by name
#[derive(Default)]
pub struct TransformFactory {
    constructors: BTreeMap<String, TransformConstructor>,
}

impl TransformFactory {
    /// Empty factory
    pub fn new() -> Self {
        Self::default()
    }

    /// Factory with every built-in transform registered
    pub fn with_builtins() -> Self {
        let mut factory = Self::new();
        factory.register_transform::<ScaleTransform>();
        factory.register_transform::<DerivativeTransform>();
        factory.register_transform::<MovingAverageTransform>();
        factory.register_transform::<OutlierRemovalTransform>();
        factory.register_transform::<IntegralTransform>();
        factory.register_transform::<QuaternionToRpy>();
        factory
    }

    /// Register `T` under the name its default instance reports
    pub fn register_transform<T>(&mut self)
    where
        T: TransformFunction + Default + 'static,
    {
        let name = T::default().name();
        self.register(name, || Box::new(T::default()));
    }

    /// Register a constructor. A later registration under the same name
    /// replaces the earlier one.
    pub fn register<F>(&mut self, name: impl Into<String>, constructor: F)
    where
        F: Fn() -> Box<dyn TransformFunction> + Send + Sync + 'static,
    {
        let name = name.into();
        if self
            .constructors
            .insert(name.clone(), Box::new(constructor))
            .is_some()
        {
            log::warn!("Transform '{}' registered twice, replacing previous", name);
        } else {
            log::debug!("Registered transform '{}'", name);
        }
    }

    /// Create a new, independent instance of the named transform
    pub fn create(&self, name: &str) -> TransformResult<Box<dyn TransformFunction>> {
        self.constructors
            .get(name)
            .map(|constructor| constructor())
            .ok_or_else(|| TransformError::Unregistered(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.constructors.contains_key(name)
    }

    /// Registered names in sorted order
    pub fn names(&self) -> Vec<&str> {
        self.constructors.keys().map(String::as_str).collect()
    }
}

impl std::fmt::Debug for TransformFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransformFactory")
            .field("names", &self.names())
            .finish()
    }
}
