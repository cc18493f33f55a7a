pub mod server;

pub mod db;
pub mod router;
pub mod sync;
pub mod http_server;

pub mod notifications;
pub mod payments;
