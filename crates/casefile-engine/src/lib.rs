//! Form version reconciliation and answer synchronisation.
//!
//! Every component receives its collaborators (record store, local cache,
//! remote gateway) through its constructor; [`Engine::new`] wires a full set
//! around one instance of each.
//!
//! ```text
//! Reconciler ──► Catalog (LocalCache) + RecordStore purge
//! AnswerStore ──► RecordStore ──► SyncDispatcher ──► RemoteGateway
//! ```

pub mod answers;
pub mod catalog;
pub mod dispatch;
pub mod error;
pub mod locks;
pub mod reconcile;
pub mod reference;
pub mod registrar;
pub mod view;

use std::sync::Arc;

use casefile_core::{cache::LocalCache, gateway::RemoteGateway, store::RecordStore};

pub use answers::AnswerStore;
pub use catalog::Catalog;
pub use dispatch::{SyncDispatcher, SyncReport, SyncStatus};
pub use error::{Result, SyncError};
pub use reconcile::{ReconcileReport, Reconciler};
pub use reference::ReferenceData;
pub use registrar::Registrar;
pub use view::FormFillView;

/// All engine components sharing one store, cache and gateway.
pub struct Engine<S, C, G> {
  pub reconciler: Reconciler<S, C, G>,
  pub answers:    AnswerStore<S, C, G>,
  pub dispatcher: SyncDispatcher<S, G>,
  pub reference:  ReferenceData<C, G>,
  pub registrar:  Registrar<S, G>,
}

impl<S, C, G> Engine<S, C, G>
where
  S: RecordStore + 'static,
  C: LocalCache + 'static,
  G: RemoteGateway + 'static,
{
  pub fn new(store: Arc<S>, cache: Arc<C>, gateway: Arc<G>) -> Self {
    let catalog    = Catalog::new(cache);
    let form_locks = locks::KeyedLocks::new();
    let dispatcher = SyncDispatcher::new(store.clone(), gateway.clone());

    Self {
      reconciler: Reconciler::new(
        store.clone(),
        catalog.clone(),
        gateway.clone(),
        form_locks.clone(),
      ),
      answers: AnswerStore::new(
        store.clone(),
        catalog.clone(),
        dispatcher.clone(),
        form_locks,
      ),
      reference: ReferenceData::new(catalog, gateway.clone()),
      registrar: Registrar::new(store, gateway, dispatcher.clone()),
      dispatcher,
    }
  }
}

#[cfg(test)]
mod tests;
