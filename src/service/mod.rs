//! Service surface
//!
//! Two handler sets over one registry: [`RemoteService`] faces devices
//! (manifest fetch, entry push), [`ViewService`] faces clients (state
//! queries, listings, history). Both are plain structs; wiring them to a
//! transport is the embedder's concern.

pub mod remote;
pub mod types;
pub mod view;

pub use remote::RemoteService;
pub use types::{
    GetRemoteConfigRequest, GetRemoteConfigResponse, GetStateRequest, GetStateResponse,
    HistoryEntry, HistoryFrame, ListStatesResponse, PushStreamEntryRequest,
    PushStreamEntryResponse, PushedEntry, StateHistoryRequest, StateListComponent, StateListState,
    StateReport, StreamContext,
};
pub use view::ViewService;
