//! Client side: remote sources that fetch, cache and hot-reload configuration.
//!
//! A [`RemoteConfigurationProvider`] owns one resource. A [`Configuration`]
//! merges any number of providers into one lock-free view and re-merges it
//! whenever a provider commits a changed snapshot.

mod builder;
mod configuration;
mod display;
mod listeners;
mod options;
mod provider;

pub use builder::ConfigurationBuilder;
pub use configuration::Configuration;
pub use display::display_periodically;
pub use listeners::{ChangeListeners, ListenerHandle};
pub use options::RemoteResourceOptions;
pub use provider::{ProviderState, RemoteConfigurationProvider, RemoteConfigurationProviderBuilder};
