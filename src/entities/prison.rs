//! Prison records.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::FormEntity;
use crate::schema::Field;

/// A stored prison record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prison {
    /// 32 lowercase hex digits on the wire.
    #[serde(with = "uuid::serde::simple")]
    pub id: Uuid,
    pub name_ru: String,
    pub name_ua: String,
    pub subject: String,
    pub object_type: String,
    pub lat: f64,
    pub lon: f64,
    pub address: String,
    pub management: String,
    pub employees_count: i64,
    pub prisoners_count: i64,
    pub staff: String,
    pub contacts: String,
}

/// Payload of `data.<form>.create`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatePrison {
    pub name_ru: String,
    pub name_ua: String,
    pub subject: String,
    pub object_type: String,
    pub lat: f64,
    pub lon: f64,
    pub address: String,
    pub management: String,
    pub employees_count: i64,
    pub prisoners_count: i64,
    pub staff: String,
    pub contacts: String,
}

impl FormEntity for Prison {
    type Create = CreatePrison;

    fn fields() -> Vec<Field> {
        vec![
            Field::string("id").optional(),
            Field::string("name_ru"),
            Field::string("name_ua"),
            Field::string("subject"),
            Field::string("object_type"),
            Field::float("lat"),
            Field::float("lon"),
            Field::string("address"),
            Field::string("management"),
            Field::integer("employees_count"),
            Field::integer("prisoners_count"),
            Field::string("staff"),
            Field::string("contacts"),
        ]
    }

    fn from_create(id: Uuid, data: CreatePrison) -> Self {
        Self {
            id,
            name_ru: data.name_ru,
            name_ua: data.name_ua,
            subject: data.subject,
            object_type: data.object_type,
            lat: data.lat,
            lon: data.lon,
            address: data.address,
            management: data.management,
            employees_count: data.employees_count,
            prisoners_count: data.prisoners_count,
            staff: data.staff,
            contacts: data.contacts,
        }
    }

    fn id(&self) -> Uuid {
        self.id
    }

    fn label(&self) -> &str {
        &self.name_ru
    }
}
