pub mod history;
pub mod record;
pub mod snapshot;
pub mod upside;
pub mod verify;
