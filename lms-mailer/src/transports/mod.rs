pub mod smtp;

pub use smtp::{SmtpTransport, SmtpTransportBuilder, TlsConfig};
