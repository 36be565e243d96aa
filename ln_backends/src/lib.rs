pub mod bolt11;
pub mod commando;
pub mod connector;
pub mod descriptor;

mod eclair;
mod lnbits;
mod lnd;
mod lnpay;
mod sparko;
mod strike;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use bolt11::DecodedInvoice;
pub use connector::{BackendConnector, ConnectorSettings, InvoiceDescription, InvoiceRequest, LightningBackend};
pub use descriptor::Backend;
