pub mod context;
pub mod lote;
pub mod multilang;
pub mod nonempty;
pub mod supported;
pub mod uri;
