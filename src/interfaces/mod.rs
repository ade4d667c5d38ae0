//! Edges of the engine: the CSV action log and order summary used by the
//! binary, and the replayer that feeds logged actions to the services.

pub mod csv;
pub mod replay;
