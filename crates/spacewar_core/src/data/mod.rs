//! Data definitions for the battle catalog.
//!
//! Pure data structures describing ships, stations, planet defenses and
//! their weapons. All of them deserialize from RON; the fixed-point fields
//! are written as plain decimals.
//!
//! **Note:** This module contains no IO. Reading files is left to the
//! embedder (see `spacewar_headless`).

mod catalog;
mod entity_data;
mod projectile_data;

pub use catalog::{default_efficiency, Catalog, CatalogData, EfficiencyEntry, TechCatalog};
pub use entity_data::{SpaceEntityDef, WeaponMount};
pub use projectile_data::{AreaEffect, ProjectileDef, ProjectileMode};
