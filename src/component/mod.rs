//! Live component previews.
//!
//! Component source (a JSX subset of JavaScript/TypeScript modules) is parsed
//! into a [`ComponentFactory`] by a [`Transform`]. Factories are opaque: they
//! render props to an [`Element`] tree, which serializes to escaped HTML.
//! Declared preview parameters are coerced into props by [`params::coerce`].

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use thiserror::Error;

pub mod cache;
pub mod jsx;
pub mod params;
pub mod render;
pub mod syntax;

pub use cache::{DEFAULT_CACHE_CAPACITY, TransformCache};
pub use jsx::JsxTransform;
pub use params::{Coerced, CoercionError, InputParameter, ParamType, coerce};
pub use render::{ComponentFactory, Element};

/// Position in component source, 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SourceLocation {
    /// Line number
    pub line: usize,
    /// Column number (in characters)
    pub column: usize,
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Component source could not be turned into a factory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformError {
    /// What went wrong; never empty
    pub message: String,
    /// Where, when the failure is tied to a source position
    pub location: Option<SourceLocation>,
}

impl TransformError {
    /// Error without a location.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            location: None,
        }
    }

    /// Error at `location`.
    pub fn at(message: impl Into<String>, location: SourceLocation) -> Self {
        Self {
            message: message.into(),
            location: Some(location),
        }
    }
}

impl fmt::Display for TransformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.location {
            Some(location) => write!(f, "{} ({})", self.message, location),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for TransformError {}

/// Rendering a factory failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    /// A capitalized tag names nothing in scope
    #[error("Unknown component <{0}>")]
    UnknownComponent(String),

    /// A name was read before being defined
    #[error("ReferenceError: {0} is not defined")]
    Reference(String),

    /// An operation was applied to the wrong kind of value
    #[error("TypeError: {0}")]
    Type(String),

    /// A string or array grew past the allowed length
    #[error("RangeError: {0}")]
    Range(String),

    /// Component nesting or recursion went too deep
    #[error("Component nesting exceeded {0} levels")]
    DepthExceeded(usize),

    /// Evaluation budget exhausted
    #[error("Render exceeded {0} evaluation steps")]
    StepLimit(usize),
}

/// Turns component source into an invokable factory.
pub trait Transform: Send + Sync {
    /// Parse `source` and select `export_name`, or the default export when
    /// `None`. Every failure is returned as a [`TransformError`].
    fn transform(
        &self,
        source: &str,
        export_name: Option<&str>,
    ) -> Result<ComponentFactory, TransformError>;
}

/// A factory bundled with coerced preview props.
#[derive(Debug, Clone)]
pub struct Preview {
    factory: ComponentFactory,
    props: serde_json::Map<String, serde_json::Value>,
    errors: BTreeMap<String, CoercionError>,
}

impl Preview {
    /// Coerce `parameters` into props for `factory`.
    pub fn new(factory: ComponentFactory, parameters: &[InputParameter]) -> Self {
        let Coerced { values, errors } = coerce(parameters);
        Self {
            factory,
            props: values,
            errors,
        }
    }

    /// Transform `source` and coerce `parameters` in one step.
    pub fn build(
        transform: &dyn Transform,
        source: &str,
        export_name: Option<&str>,
        parameters: &[InputParameter],
    ) -> Result<Self, TransformError> {
        let factory = transform.transform(source, export_name)?;
        Ok(Self::new(factory, parameters))
    }

    /// The factory being previewed.
    pub fn factory(&self) -> &ComponentFactory {
        &self.factory
    }

    /// Props that coerced successfully.
    pub fn props(&self) -> &serde_json::Map<String, serde_json::Value> {
        &self.props
    }

    /// Per-parameter coercion failures.
    pub fn errors(&self) -> &BTreeMap<String, CoercionError> {
        &self.errors
    }

    /// Render with the coerced props.
    pub fn render(&self) -> Result<Element, RenderError> {
        self.factory
            .render(&serde_json::Value::Object(self.props.clone()))
    }
}
