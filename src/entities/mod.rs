//! Concrete entity definitions served through a form.
//!
//! The messaging core is generic over [`FormEntity`]; each deployment
//! instantiates it once with the entity its form describes.

mod prison;

pub use prison::{CreatePrison, Prison};

use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use crate::config::FormConfig;
use crate::schema::{Field, Form};

/// An entity whose shape is published as a [`Form`].
pub trait FormEntity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Creation payload: every field except the identifier.
    type Create: DeserializeOwned + Send + 'static;

    /// Field list, in the order the form advertises it.
    fn fields() -> Vec<Field>;

    /// Build a new entity from a creation payload and a freshly generated id.
    fn from_create(id: Uuid, data: Self::Create) -> Self;

    fn id(&self) -> Uuid;

    /// Short human-readable label used in logs.
    fn label(&self) -> &str;
}

/// Build the process-wide form for entity `E`.
pub fn form_for<E: FormEntity>(config: &FormConfig) -> Form {
    Form::new(config.name.clone(), config.description.clone(), E::fields())
}
