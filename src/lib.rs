pub mod config;
pub mod db;
pub mod error;
pub mod model;
pub mod normalize;
pub mod pipeline;
pub mod registry;
pub mod segment;
pub mod sources;
pub mod stats;

pub use db::{ConnectionProvider, Database};
pub use error::{Error, Result};
pub use model::{Employer, Salary, Source, Vacancy};
pub use pipeline::FilterPipeline;
pub use registry::{CompanySource, Registry, TargetCompany};
