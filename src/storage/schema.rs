//! Database schema definitions using sea-query.
//!
//! These define the table and column identifiers for type-safe query building.

use sea_query::Iden;

/// Prison table schema.
#[derive(Iden, Clone, Copy)]
pub enum Prisons {
    #[iden = "prison"]
    Table,
    #[iden = "id"]
    Id,
    #[iden = "name_ru"]
    NameRu,
    #[iden = "name_ua"]
    NameUa,
    #[iden = "subject"]
    Subject,
    #[iden = "object_type"]
    ObjectType,
    #[iden = "lat"]
    Lat,
    #[iden = "lon"]
    Lon,
    #[iden = "address"]
    Address,
    #[iden = "management"]
    Management,
    #[iden = "employees_count"]
    EmployeesCount,
    #[iden = "prisoners_count"]
    PrisonersCount,
    #[iden = "staff"]
    Staff,
    #[iden = "contacts"]
    Contacts,
}

impl Prisons {
    /// Every column, in insert/select order.
    pub const COLUMNS: [Prisons; 13] = [
        Prisons::Id,
        Prisons::NameRu,
        Prisons::NameUa,
        Prisons::Subject,
        Prisons::ObjectType,
        Prisons::Lat,
        Prisons::Lon,
        Prisons::Address,
        Prisons::Management,
        Prisons::EmployeesCount,
        Prisons::PrisonersCount,
        Prisons::Staff,
        Prisons::Contacts,
    ];
}

/// SQL for creating the prison table.
///
/// `id` holds the identifier as 32 lowercase hex characters.
pub const CREATE_PRISON_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS prison (
    id CHAR(32) NOT NULL PRIMARY KEY,
    name_ru TEXT NOT NULL,
    name_ua TEXT NOT NULL,
    subject TEXT NOT NULL,
    object_type TEXT NOT NULL,
    lat REAL NOT NULL,
    lon REAL NOT NULL,
    address TEXT NOT NULL,
    management TEXT NOT NULL,
    employees_count INTEGER NOT NULL,
    prisoners_count INTEGER NOT NULL,
    staff TEXT NOT NULL,
    contacts TEXT NOT NULL
);
"#;
