// autonomy_core/src/models/mod.rs

pub mod estimation;
pub mod perception;
