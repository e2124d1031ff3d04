pub mod builders;
pub mod db;
pub mod random;

pub use builders::ClientBuilder;
pub use db::TestDb;
pub use random::ScriptedRandom;
