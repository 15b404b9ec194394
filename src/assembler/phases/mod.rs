pub mod types;

pub mod compile;
pub mod expr;
pub mod precompile;
pub mod preprocess;
pub mod resolve;
pub mod serialize;
pub mod tokenize;
pub mod validate;

pub use compile::compile;
pub use precompile::precompile;
pub use resolve::resolve;
pub use serialize::serialize;
pub use tokenize::tokenize;
