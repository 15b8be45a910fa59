// Incremental view models for a torrent daemon client

pub mod binding;
pub mod client;
pub mod columns;
pub mod config;
pub mod diff;
pub mod error;
pub mod filter;
pub mod form;
pub mod formats;
pub mod natsort;
pub mod persistent;
pub mod poll;
pub mod projection;
pub mod session;
pub mod signal;
pub mod sort_key;
pub mod table;
pub mod tree;
pub mod value;
pub mod views;

// Re-export commonly used types
pub use binding::{KeyedModel, ViewBinding};
pub use client::{run_poll_loop, Client, TickReport};
pub use config::{load_config, ClientConfig};
pub use diff::{diff, DiffOutcome, SortOrder, SortSpec};
pub use error::{ModelError, ModelResult};
pub use poll::{FetchTicket, PollState};
pub use projection::{CellValue, Column, Projection, Role};
pub use session::{Command, CommandSink, SessionEvent, SessionProxy, StateDirSession, StatusFilter};
pub use signal::ModelSignal;
pub use table::TableModel;
pub use tree::{FileEntry, FileTree, NodeId};
pub use value::{FieldSource, Record, Snapshot, Value};
pub use views::{ApplyOutcome, DetailsView, FileTreeView, PeerListView, TorrentListView};
