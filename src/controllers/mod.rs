pub mod gateway;
pub mod parents;
pub mod policy;
pub mod route;
pub mod translator;

mod utils;

pub use policy::PolicyPlugin;
pub use translator::Translator;
