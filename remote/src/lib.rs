pub mod config;
pub mod github;
pub mod store;
pub mod types;

pub use config::GithubConfig;
pub use github::GithubStore;
pub use store::{RemoteError, RemoteObjectStore, RemoteResult};
pub use types::{
    BlobEncoding, CommitLookup, GitLocation, GitObjectRef, Identity, PendingWrite, Permission,
    RefUpdate, RemoteTree, RepoInfo, TreeEntry, TreeEntryKind, TreeWriteEntry,
};

pub mod prelude {
    pub use crate::config::*;
    pub use crate::github::*;
    pub use crate::store::*;
    pub use crate::types::*;
}
