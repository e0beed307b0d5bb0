//! UniFi controller session layer

pub mod client;

pub use client::{
    normalize_mac, ClientEntry, ConnectionState, ConnectionStatus, ControllerApi, UnifiClient,
    WlanConf,
};
