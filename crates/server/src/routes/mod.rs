pub mod api;
pub mod audio;
pub mod health;
pub mod sms;
pub mod voice;
