//! Data access, one repository per aggregate. Repositories return
//! `sqlx` results; handlers translate missing rows into 404s and
//! constraint violations into 400s.

mod producers;
mod products;
mod sale_modes;
mod users;

pub use producers::{ProducerListFilter, ProducerRepository};
pub use products::ProductRepository;
pub use sale_modes::SaleModeRepository;
pub use users::UserRepository;
