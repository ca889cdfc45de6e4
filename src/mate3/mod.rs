pub mod frame;
pub mod listener;
pub mod modes;
pub mod record;
