//! glueforward: keep a torrent-style service's listening port in sync with the
//! port gluetun forwards. Hexagonal layout: domain, ports, adapters, use cases.

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod shared;
pub mod usecases;
