use std::marker::PhantomData;
use std::sync::Arc;

use thiserror::Error;

use super::PagingDefaults;
use crate::database::{Collection, Resource};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DescriptorError {
    #[error("Model path must not be empty")]
    EmptyPath,

    #[error("Model path must start with '/': {0}")]
    MissingLeadingSlash(String),

    #[error("Model path must not end with '/': {0}")]
    TrailingSlash(String),

    #[error("Parent id property must not be empty")]
    EmptyParentProperty,

    #[error("Storage for '{collection}' is keyed by '{storage}', model expects '{model}'")]
    PrimaryKeyMismatch {
        collection: String,
        storage: String,
        model: &'static str,
    },
}

/// Registration-time description of one REST resource backed by `T`.
pub struct ModelDescriptor<T: Resource> {
    path: String,
    storage: Arc<dyn Collection>,
    parent_id_property: Option<String>,
    requires_auth: bool,
    paging: PagingDefaults,
    _model: PhantomData<fn() -> T>,
}

impl<T: Resource> ModelDescriptor<T> {
    pub fn new(path: impl Into<String>, storage: Arc<dyn Collection>) -> Result<Self, DescriptorError> {
        let path = path.into();
        if path.is_empty() {
            return Err(DescriptorError::EmptyPath);
        }
        if !path.starts_with('/') {
            return Err(DescriptorError::MissingLeadingSlash(path));
        }
        if path.ends_with('/') {
            return Err(DescriptorError::TrailingSlash(path));
        }
        if storage.primary_key() != T::PRIMARY_KEY {
            return Err(DescriptorError::PrimaryKeyMismatch {
                collection: storage.name().to_string(),
                storage: storage.primary_key().to_string(),
                model: T::PRIMARY_KEY,
            });
        }

        Ok(Self {
            path,
            storage,
            parent_id_property: None,
            requires_auth: false,
            paging: PagingDefaults::default(),
            _model: PhantomData,
        })
    }

    /// Scope creates and updates to the caller id stored under `property`.
    pub fn with_parent_id_property(mut self, property: impl Into<String>) -> Result<Self, DescriptorError> {
        let property = property.into();
        if property.trim().is_empty() {
            return Err(DescriptorError::EmptyParentProperty);
        }
        self.parent_id_property = Some(property);
        Ok(self)
    }

    pub fn requires_auth(mut self, requires_auth: bool) -> Self {
        self.requires_auth = requires_auth;
        self
    }

    pub fn with_paging(mut self, paging: PagingDefaults) -> Self {
        self.paging = paging;
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn primary_key(&self) -> &'static str {
        T::PRIMARY_KEY
    }

    pub fn parent_id_property(&self) -> Option<&str> {
        self.parent_id_property.as_deref()
    }

    pub fn is_auth_required(&self) -> bool {
        self.requires_auth
    }

    pub fn paging(&self) -> PagingDefaults {
        self.paging
    }

    pub fn storage(&self) -> &Arc<dyn Collection> {
        &self.storage
    }
}

impl<T: Resource> std::fmt::Debug for ModelDescriptor<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelDescriptor")
            .field("path", &self.path)
            .field("primary_key", &T::PRIMARY_KEY)
            .field("collection", &self.storage.name())
            .field("parent_id_property", &self.parent_id_property)
            .field("requires_auth", &self.requires_auth)
            .field("paging", &self.paging)
            .finish()
    }
}
