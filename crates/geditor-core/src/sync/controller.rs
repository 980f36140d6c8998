//! Sync controller
//!
//! State machine keeping one open document, its draft and the document
//! list in step with the server.
//!
//! ## Lifecycle
//!
//! `Unauthenticated → Authenticating → AwaitingConnection → Connected → DocumentOpen`
//!
//! The controller never does I/O on its own. It reacts to transport events
//! (`handle_event`) and user operations, and talks to the server through the
//! injected [`Transport`]. Observers follow along through [`SyncEvent`]s and
//! the connection status channel.
//!
//! ## Consistency
//!
//! Body text is last-writer-wins: an `editor.change` from another session
//! overwrites the local draft, with no merging.

use std::collections::{HashMap, VecDeque};

use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use super::gate::{ConfirmationGate, LeaveChoice, LeaveOutcome};
use super::message::{
    AckId, ClientEvent, ClientMessage, ListReply, Reply, SavePayload, ServerMessage,
    UpdatePayload,
};
use super::transport::{ConnectOutcome, ListenerId, Subscription, Transport, TransportEvent};
use crate::dirty;
use crate::error::{SyncError, SyncResult};
use crate::models::{Document, DocumentContent, DocumentId};
use crate::navigation::NavigationContext;
use crate::token::{AccessToken, TokenError};
use crate::validation::validate_content;

/// Where the controller is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No token, no connection
    Unauthenticated,
    /// Waiting for the token provider
    Authenticating,
    /// Token handed to the transport, waiting for it to connect
    AwaitingConnection,
    /// Connected, no document open
    Connected,
    /// Connected with a persisted document open
    DocumentOpen,
    /// The token provider failed; nothing is retried
    LoadFailed,
}

/// Connection status as reported by the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Events emitted by the sync controller
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// Lifecycle state changed
    StateChanged(SessionState),
    /// Connection status changed
    StatusChanged(ConnectionState),
    /// The document list was replaced
    ListChanged(Vec<Document>),
    /// A document was loaded into the snapshot and draft
    DocumentOpened(Document),
    /// The server confirmed a save of this document
    DocumentSaved(Document),
    /// The server confirmed an update
    DocumentUpdated(Option<DocumentId>),
    /// Another session changed the body text
    DraftChanged(DocumentContent),
    /// Draft, snapshot and navigation context were cleared
    DocumentClosed,
    /// The user must choose what to do with unsaved changes
    LeaveConfirmationRequired,
    /// Something failed; the last known-good state is kept
    Error(SyncError),
}

/// Read-only picture of the controller, for front ends
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerView {
    pub state: SessionState,
    pub connection: ConnectionState,
    pub open_document: Option<DocumentId>,
    pub draft: DocumentContent,
    pub snapshot: DocumentContent,
    pub dirty: bool,
    pub awaiting_confirmation: bool,
    pub documents: Vec<Document>,
}

/// Request waiting for an `ack` reply
#[derive(Debug)]
enum PendingRequest {
    Open(DocumentId),
    List,
}

/// Save waiting for its `document.list` confirmation push
#[derive(Debug)]
struct PendingSave {
    /// Document being overwritten; `None` creates a new one
    target: Option<DocumentId>,
    /// Whether the saved document becomes the open one
    open_on_confirm: bool,
}

/// Realtime document synchronization controller
pub struct SyncController<T, N> {
    transport: T,
    navigation: N,
    state: SessionState,
    /// Current connection status
    status: watch::Sender<ConnectionState>,
    /// Status receiver for external monitoring
    status_rx: watch::Receiver<ConnectionState>,
    /// Event channel
    event_tx: mpsc::UnboundedSender<SyncEvent>,
    /// Event receiver, until taken
    event_rx: Option<mpsc::UnboundedReceiver<SyncEvent>>,
    listener: Option<ListenerId>,
    next_ack: AckId,
    pending: HashMap<AckId, PendingRequest>,
    pending_saves: VecDeque<PendingSave>,
    pending_updates: VecDeque<DocumentId>,
    open_id: Option<DocumentId>,
    snapshot: DocumentContent,
    draft: DocumentContent,
    documents: Vec<Document>,
    awaiting_leave: bool,
}

impl<T, N> SyncController<T, N>
where
    T: Transport,
    N: NavigationContext,
{
    /// Create a controller owning its transport and navigation context
    pub fn new(transport: T, navigation: N) -> Self {
        let (status, status_rx) = watch::channel(ConnectionState::Disconnected);
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        Self {
            transport,
            navigation,
            state: SessionState::Unauthenticated,
            status,
            status_rx,
            event_tx,
            event_rx: Some(event_rx),
            listener: None,
            next_ack: 0,
            pending: HashMap::new(),
            pending_saves: VecDeque::new(),
            pending_updates: VecDeque::new(),
            open_id: None,
            snapshot: DocumentContent::default(),
            draft: DocumentContent::default(),
            documents: Vec::new(),
            awaiting_leave: false,
        }
    }

    // ------------------------------------------------------------------
    // Observation
    // ------------------------------------------------------------------

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.status_rx.borrow()
    }

    /// Subscribe to connection status changes
    pub fn subscribe_status(&self) -> watch::Receiver<ConnectionState> {
        self.status_rx.clone()
    }

    /// Take the event receiver
    ///
    /// Taking it again opens a fresh channel; the earlier receiver then
    /// stops getting events.
    pub fn take_events(&mut self) -> mpsc::UnboundedReceiver<SyncEvent> {
        match self.event_rx.take() {
            Some(rx) => rx,
            None => {
                let (event_tx, event_rx) = mpsc::unbounded_channel();
                self.event_tx = event_tx;
                event_rx
            }
        }
    }

    pub fn draft(&self) -> &DocumentContent {
        &self.draft
    }

    pub fn snapshot(&self) -> &DocumentContent {
        &self.snapshot
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn open_document_id(&self) -> Option<&DocumentId> {
        self.open_id.as_ref()
    }

    /// Whether the draft has unsaved changes
    pub fn is_dirty(&self) -> bool {
        dirty::is_dirty(&self.snapshot, &self.draft)
    }

    pub fn awaiting_confirmation(&self) -> bool {
        self.awaiting_leave
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn navigation(&self) -> &N {
        &self.navigation
    }

    pub fn view(&self) -> ControllerView {
        ControllerView {
            state: self.state,
            connection: self.connection_state(),
            open_document: self.open_id.clone(),
            draft: self.draft.clone(),
            snapshot: self.snapshot.clone(),
            dirty: self.is_dirty(),
            awaiting_confirmation: self.awaiting_leave,
            documents: self.documents.clone(),
        }
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Register for transport events
    ///
    /// Must be paired with `unmount` so no handler outlives the controller's
    /// use of the transport.
    pub fn mount(&mut self) -> Subscription {
        if let Some(previous) = self.listener.take() {
            self.transport.unsubscribe(previous);
        }
        let subscription = self.transport.subscribe();
        self.listener = Some(subscription.id());
        subscription
    }

    /// Remove the transport registration made by `mount`
    pub fn unmount(&mut self) {
        if let Some(id) = self.listener.take() {
            self.transport.unsubscribe(id);
            debug!("Controller unmounted");
        }
    }

    pub fn is_mounted(&self) -> bool {
        self.listener.is_some()
    }

    /// A token request is in flight
    pub fn begin_authentication(&mut self) {
        self.set_state(SessionState::Authenticating);
    }

    /// Result of the token request
    pub fn token_received(&mut self, token: Result<AccessToken, TokenError>) {
        match token {
            Ok(token) => {
                self.set_state(SessionState::AwaitingConnection);
                match self.transport.connect(&token) {
                    ConnectOutcome::Created => debug!("Transport connecting"),
                    ConnectOutcome::Existing => {
                        debug!("Reusing existing connection, new token not propagated");
                        if self.connection_state() == ConnectionState::Connected {
                            self.on_connected();
                        }
                    }
                }
            }
            Err(e) => {
                self.set_state(SessionState::LoadFailed);
                self.report(SyncError::TokenFetch(e.to_string()));
            }
        }
    }

    /// Close the connection on purpose
    pub fn disconnect(&mut self) {
        self.transport.disconnect();
        self.drop_pending();
        self.set_connection(ConnectionState::Disconnected);
        self.set_state(SessionState::Unauthenticated);
    }

    /// React to a transport event
    pub fn handle_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Connecting => self.set_connection(ConnectionState::Connecting),
            TransportEvent::Connected => self.on_connected(),
            TransportEvent::Disconnected { reason } => self.on_disconnected(reason),
            TransportEvent::Rejected { reason } => self.on_rejected(reason),
            TransportEvent::Message(message) => self.on_message(message),
        }
    }

    /// Surface an error to observers
    pub fn report(&mut self, error: SyncError) {
        warn!("{}", error);
        self.emit(SyncEvent::Error(error));
    }

    // ------------------------------------------------------------------
    // Operations
    // ------------------------------------------------------------------

    /// Ask the server for a persisted document
    pub fn open_document(&mut self, id: &str) -> SyncResult<()> {
        let id = DocumentId::parse(id).map_err(|_| SyncError::InvalidDocumentId(id.to_string()))?;
        self.send_open(id)
    }

    /// Ask the server for the full document list
    pub fn request_list(&mut self) -> SyncResult<()> {
        self.send(ClientEvent::List, Some(PendingRequest::List))
    }

    /// Validate the draft and send it as a save
    ///
    /// Overwrites the open document, or creates a new one when none is open.
    /// The snapshot only changes once the server confirms.
    pub fn save(&mut self) -> SyncResult<()> {
        self.send_save(true)
    }

    /// Validate the draft and send it as an update of the open document
    pub fn update(&mut self) -> SyncResult<()> {
        let content = validate_content(&self.draft)?;
        let id = self.open_id.clone().ok_or(SyncError::NoOpenDocument)?;

        self.send(
            ClientEvent::Update(UpdatePayload {
                document_id: id.clone(),
                title: content.title,
                text: content.text,
            }),
            None,
        )?;
        self.pending_updates.push_back(id);
        Ok(())
    }

    /// Local title edit
    pub fn edit_title(&mut self, title: impl Into<String>) {
        self.draft.title = title.into();
    }

    /// Local body edit, broadcast in full to other sessions
    pub fn edit_text(&mut self, text: impl Into<String>) -> SyncResult<()> {
        let text = text.into();
        self.draft.text = text.clone();

        if self.connection_state() != ConnectionState::Connected {
            debug!("Offline, body edit kept locally");
            return Ok(());
        }
        self.send(ClientEvent::EditorChange(text), None)
    }

    /// Start a new document
    ///
    /// With unsaved changes this only asks for confirmation; answer with
    /// `resolve_leave`.
    pub fn new_document(&mut self) -> LeaveOutcome {
        if self.awaiting_leave {
            return LeaveOutcome::ConfirmationRequired;
        }
        if self.is_dirty() {
            self.awaiting_leave = true;
            self.emit(SyncEvent::LeaveConfirmationRequired);
            return LeaveOutcome::ConfirmationRequired;
        }
        self.reset_document();
        LeaveOutcome::Left
    }

    /// Answer a pending leave confirmation
    pub fn resolve_leave(&mut self, choice: LeaveChoice) -> SyncResult<LeaveOutcome> {
        if !self.awaiting_leave {
            return Err(SyncError::NoPendingConfirmation);
        }
        self.awaiting_leave = false;

        match choice {
            LeaveChoice::Cancel => Ok(LeaveOutcome::Cancelled),
            LeaveChoice::Discard => {
                self.reset_document();
                Ok(LeaveOutcome::Left)
            }
            LeaveChoice::SaveAndLeave => {
                if self.open_id.is_some() {
                    self.update()?;
                } else {
                    self.send_save(false)?;
                }
                self.reset_document();
                Ok(LeaveOutcome::Left)
            }
        }
    }

    /// Start a new document, asking `gate` if there are unsaved changes
    pub fn new_document_with<G>(&mut self, gate: &mut G) -> SyncResult<LeaveOutcome>
    where
        G: ConfirmationGate + ?Sized,
    {
        match self.new_document() {
            LeaveOutcome::ConfirmationRequired => {
                let choice = gate.confirm_leave(&self.draft);
                self.resolve_leave(choice)
            }
            outcome => Ok(outcome),
        }
    }

    // ------------------------------------------------------------------
    // Transport events
    // ------------------------------------------------------------------

    fn on_connected(&mut self) {
        self.set_connection(ConnectionState::Connected);
        self.set_state(if self.open_id.is_some() {
            SessionState::DocumentOpen
        } else {
            SessionState::Connected
        });

        if let Err(e) = self.request_list() {
            self.report(e);
        }

        if self.open_id.is_none() {
            if let Some(id) = self.navigation.current() {
                info!(document = %id, "Restoring document from navigation context");
                if let Err(e) = self.send_open(id) {
                    self.report(e);
                }
            }
        }
    }

    fn on_disconnected(&mut self, reason: Option<String>) {
        debug!(
            "Transport disconnected: {}",
            reason.as_deref().unwrap_or("no reason given")
        );
        self.drop_pending();
        self.set_connection(ConnectionState::Disconnected);
        if matches!(
            self.state,
            SessionState::Connected | SessionState::DocumentOpen
        ) {
            self.set_state(SessionState::AwaitingConnection);
        }
    }

    fn on_rejected(&mut self, reason: String) {
        self.transport.disconnect();
        self.drop_pending();
        self.set_connection(ConnectionState::Disconnected);
        self.set_state(SessionState::Unauthenticated);
        self.report(SyncError::ConnectRejected(reason));
    }

    fn on_message(&mut self, message: ServerMessage) {
        match message {
            ServerMessage::Ack { ack, data } => self.on_ack(ack, data),
            ServerMessage::DocumentList(reply) => self.on_list_push(reply),
            ServerMessage::DocumentUpdate(reply) => self.on_update_push(reply),
            ServerMessage::EditorChange(text) => self.on_remote_edit(text),
        }
    }

    fn on_ack(&mut self, ack: AckId, data: Value) {
        let Some(request) = self.pending.remove(&ack) else {
            debug!(ack, "Ignoring reply to unknown request");
            return;
        };

        match request {
            PendingRequest::List => {
                let result = ServerMessage::decode_reply::<Vec<Document>>(data)
                    .map_err(|e| e.to_string())
                    .and_then(Reply::into_result);
                match result {
                    Ok(documents) => self.replace_documents(documents),
                    Err(message) => self.report(SyncError::ListRejected(message)),
                }
            }
            PendingRequest::Open(id) => {
                let result = ServerMessage::decode_reply::<Document>(data)
                    .map_err(|e| e.to_string())
                    .and_then(Reply::into_result);
                match result {
                    Ok(document) => self.load_document(id, document),
                    Err(message) => self.on_open_failed(id, message),
                }
            }
        }
    }

    /// `document.list` push: a list refresh, and the confirmation of our
    /// oldest pending save if there is one
    fn on_list_push(&mut self, reply: ListReply) {
        match reply.into_result() {
            Ok(documents) => {
                let confirmed = self.pending_saves.pop_front();
                self.replace_documents(documents);
                if let Some(save) = confirmed {
                    self.confirm_save(save);
                }
            }
            Err(message) => match self.pending_saves.pop_front() {
                Some(_) => self.report(SyncError::SaveRejected(message)),
                None => self.report(SyncError::ListRejected(message)),
            },
        }
    }

    fn on_update_push(&mut self, reply: ListReply) {
        let target = self.pending_updates.pop_front();
        match reply.into_result() {
            Ok(documents) => {
                self.replace_documents(documents);
                if let Some(id) = target.as_ref().filter(|id| self.open_id.as_ref() == Some(*id)) {
                    if let Some(content) = self.find_document(id).map(Document::content) {
                        self.snapshot = content;
                    }
                }
                info!("Update confirmed");
                self.emit(SyncEvent::DocumentUpdated(target));
            }
            Err(message) => self.report(SyncError::UpdateRejected(message)),
        }
    }

    /// Last writer wins
    fn on_remote_edit(&mut self, text: String) {
        debug!("Remote body edit ({} chars)", text.chars().count());
        self.draft.text = text;
        self.emit(SyncEvent::DraftChanged(self.draft.clone()));
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn send_open(&mut self, id: DocumentId) -> SyncResult<()> {
        self.send(
            ClientEvent::Open { id: id.clone() },
            Some(PendingRequest::Open(id)),
        )
    }

    fn send_save(&mut self, open_on_confirm: bool) -> SyncResult<()> {
        let content = validate_content(&self.draft)?;
        let target = self.open_id.clone();

        self.send(
            ClientEvent::Save(SavePayload {
                document_id: target.clone(),
                title: content.title,
                text: content.text,
            }),
            None,
        )?;
        self.pending_saves.push_back(PendingSave {
            target,
            open_on_confirm,
        });
        Ok(())
    }

    /// Emit on the wire, tracking requests that expect a reply
    fn send(&mut self, event: ClientEvent, request: Option<PendingRequest>) -> SyncResult<()> {
        if self.connection_state() != ConnectionState::Connected {
            return Err(SyncError::NotConnected);
        }

        let message = match request {
            Some(_) => {
                self.next_ack += 1;
                ClientMessage::with_ack(event, self.next_ack)
            }
            None => ClientMessage::new(event),
        };
        let ack = message.ack;
        debug!(event = message.event.name(), ?ack, "Emitting");

        self.transport
            .emit(message)
            .map_err(|e| SyncError::Transport(e.to_string()))?;

        if let (Some(ack), Some(request)) = (ack, request) {
            self.pending.insert(ack, request);
        }
        Ok(())
    }

    fn load_document(&mut self, requested: DocumentId, document: Document) {
        let id = document.id.clone().unwrap_or(requested);
        info!(document = %id, "Document opened");

        self.snapshot = document.content();
        self.draft = document.content();
        self.open_id = Some(id.clone());
        self.set_navigation(Some(&id));
        self.set_state(SessionState::DocumentOpen);
        self.emit(SyncEvent::DocumentOpened(document));
    }

    fn on_open_failed(&mut self, id: DocumentId, message: String) {
        // Point the location back at whatever is really open
        let current = self.open_id.clone();
        self.set_navigation(current.as_ref());
        self.report(SyncError::DocumentNotFound {
            id: id.to_string(),
            message,
        });
    }

    fn confirm_save(&mut self, save: PendingSave) {
        let saved = save
            .target
            .as_ref()
            .and_then(|id| self.find_document(id))
            .or_else(|| self.documents.last())
            .cloned();
        let Some(document) = saved else {
            debug!("Save confirmed but the list is empty");
            return;
        };
        info!(document = ?document.id, "Save confirmed");

        if save.open_on_confirm {
            if let Some(id) = document.id.clone() {
                self.snapshot = document.content();
                self.draft = document.content();
                self.open_id = Some(id.clone());
                self.set_navigation(Some(&id));
                self.set_state(SessionState::DocumentOpen);
            }
        }
        self.emit(SyncEvent::DocumentSaved(document));
    }

    fn find_document(&self, id: &DocumentId) -> Option<&Document> {
        self.documents.iter().find(|d| d.id.as_ref() == Some(id))
    }

    fn replace_documents(&mut self, documents: Vec<Document>) {
        debug!("Document list replaced ({} entries)", documents.len());
        self.documents = documents;
        self.emit(SyncEvent::ListChanged(self.documents.clone()));
    }

    fn reset_document(&mut self) {
        self.snapshot = DocumentContent::default();
        self.draft = DocumentContent::default();
        self.open_id = None;
        self.set_navigation(None);
        if self.state == SessionState::DocumentOpen {
            self.set_state(SessionState::Connected);
        }
        self.emit(SyncEvent::DocumentClosed);
    }

    /// In-flight requests do not survive the connection they were sent on
    fn drop_pending(&mut self) {
        let in_flight = self.pending.len() + self.pending_saves.len() + self.pending_updates.len();
        if in_flight > 0 {
            debug!("Dropping {} in-flight requests", in_flight);
        }
        self.pending.clear();
        self.pending_saves.clear();
        self.pending_updates.clear();
    }

    fn set_navigation(&mut self, id: Option<&DocumentId>) {
        if let Err(e) = self.navigation.set_current(id) {
            warn!("Failed to update navigation context: {}", e);
        }
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state != state {
            debug!(from = ?self.state, to = ?state, "Session state");
            self.state = state;
            self.emit(SyncEvent::StateChanged(state));
        }
    }

    fn set_connection(&mut self, status: ConnectionState) {
        if self.connection_state() != status {
            let _ = self.status.send(status);
            self.emit(SyncEvent::StatusChanged(status));
        }
    }

    fn emit(&self, event: SyncEvent) {
        let _ = self.event_tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::navigation::{Location, MemoryNavigation};
    use crate::sync::message::{EVENT_LIST, EVENT_OPEN};
    use crate::sync::testing::RecordingTransport;
    use serde_json::json;

    type TestController = SyncController<RecordingTransport, MemoryNavigation>;

    fn id(s: &str) -> DocumentId {
        DocumentId::parse(s).unwrap()
    }

    fn doc(doc_id: &str, title: &str, text: &str) -> Document {
        Document {
            id: Some(id(doc_id)),
            author_id: Some("user_1".to_string()),
            title: title.to_string(),
            text: text.to_string(),
        }
    }

    fn navigation(location: &str) -> MemoryNavigation {
        MemoryNavigation::new(Location::parse(location).unwrap())
    }

    fn controller() -> TestController {
        SyncController::new(RecordingTransport::new(), navigation("http://app.test/"))
    }

    /// Authenticate and connect, answering the initial list request
    fn connect(controller: &mut TestController, documents: Vec<Document>) {
        controller.begin_authentication();
        controller.token_received(Ok(AccessToken::new("token")));
        controller.handle_event(TransportEvent::Connecting);
        controller.handle_event(TransportEvent::Connected);
        let ack = controller.transport().last_ack_for(EVENT_LIST).unwrap();
        reply(controller, ack, json!({"success": true, "data": documents}));
    }

    fn reply(controller: &mut TestController, ack: AckId, data: Value) {
        controller.handle_event(TransportEvent::Message(ServerMessage::Ack { ack, data }));
    }

    fn open(controller: &mut TestController, document: &Document) {
        let doc_id = document.id.clone().unwrap();
        controller.open_document(doc_id.as_str()).unwrap();
        let ack = controller.transport().last_ack_for(EVENT_OPEN).unwrap();
        reply(controller, ack, json!({"success": true, "data": document}));
    }

    fn list_push(documents: Vec<Document>) -> TransportEvent {
        TransportEvent::Message(ServerMessage::DocumentList(Reply::ok(documents)))
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<SyncEvent>) -> Vec<SyncEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn test_lifecycle_to_connected() {
        let mut c = controller();
        let mut events = c.take_events();
        assert_eq!(c.state(), SessionState::Unauthenticated);

        c.begin_authentication();
        assert_eq!(c.state(), SessionState::Authenticating);

        c.token_received(Ok(AccessToken::new("token")));
        assert_eq!(c.state(), SessionState::AwaitingConnection);
        assert_eq!(c.transport().tokens.len(), 1);
        // Status follows the transport, not the call to connect
        assert_eq!(c.connection_state(), ConnectionState::Disconnected);

        c.handle_event(TransportEvent::Connecting);
        assert_eq!(c.connection_state(), ConnectionState::Connecting);

        c.handle_event(TransportEvent::Connected);
        assert_eq!(c.state(), SessionState::Connected);
        assert_eq!(c.connection_state(), ConnectionState::Connected);
        assert_eq!(c.transport().events(), vec![ClientEvent::List]);

        let events = drain(&mut events);
        assert!(events.contains(&SyncEvent::StatusChanged(ConnectionState::Connected)));
        assert!(events.contains(&SyncEvent::StateChanged(SessionState::Connected)));
    }

    #[test]
    fn test_list_reply_replaces_cache() {
        let mut c = controller();
        connect(&mut c, vec![doc("a", "One", "first")]);
        assert_eq!(c.documents().len(), 1);

        c.request_list().unwrap();
        let ack = c.transport().last_ack_for(EVENT_LIST).unwrap();
        reply(&mut c, ack, json!({"success": true, "data": [doc("b", "Two", "second")]}));

        assert_eq!(c.documents(), &[doc("b", "Two", "second")]);
    }

    #[test]
    fn test_token_failure() {
        let mut c = controller();
        let mut events = c.take_events();
        c.begin_authentication();
        c.token_received(Err(TokenError::Status(500)));

        assert_eq!(c.state(), SessionState::LoadFailed);
        assert!(c.transport().tokens.is_empty());
        assert!(drain(&mut events)
            .iter()
            .any(|e| matches!(e, SyncEvent::Error(SyncError::TokenFetch(_)))));
    }

    #[test]
    fn test_connect_rejected_is_distinct() {
        let mut c = controller();
        let mut events = c.take_events();
        c.begin_authentication();
        c.token_received(Ok(AccessToken::new("expired")));
        c.handle_event(TransportEvent::Rejected {
            reason: "server answered HTTP 401 Unauthorized".into(),
        });

        assert_eq!(c.state(), SessionState::Unauthenticated);
        assert_eq!(c.connection_state(), ConnectionState::Disconnected);
        assert!(c.transport().connection().is_none());
        assert!(drain(&mut events)
            .iter()
            .any(|e| matches!(e, SyncEvent::Error(SyncError::ConnectRejected(_)))));
    }

    #[test]
    fn test_second_token_keeps_connection() {
        let mut c = controller();
        connect(&mut c, vec![]);
        c.transport.take_sent();

        c.token_received(Ok(AccessToken::new("refreshed")));
        assert_eq!(c.transport().tokens.len(), 1);
        assert_eq!(c.state(), SessionState::Connected);
    }

    #[test]
    fn test_operations_need_connection() {
        let mut c = controller();
        assert_eq!(c.request_list(), Err(SyncError::NotConnected));
        assert_eq!(c.open_document("a"), Err(SyncError::NotConnected));

        c.edit_title("Hi");
        c.edit_text("ab").unwrap();
        assert_eq!(c.save(), Err(SyncError::NotConnected));
        assert_eq!(c.draft(), &DocumentContent::new("Hi", "ab"));
    }

    #[test]
    fn test_open_document_loads_snapshot_and_draft() {
        let mut c = controller();
        connect(&mut c, vec![]);
        let mut events = c.take_events();
        let document = doc("a1", "Groceries", "milk eggs");

        open(&mut c, &document);

        assert_eq!(c.state(), SessionState::DocumentOpen);
        assert_eq!(c.snapshot(), &document.content());
        assert_eq!(c.draft(), &document.content());
        assert!(!c.is_dirty());
        assert_eq!(c.open_document_id(), Some(&id("a1")));
        assert_eq!(c.navigation().current(), Some(id("a1")));
        assert!(drain(&mut events).contains(&SyncEvent::DocumentOpened(document)));
    }

    #[test]
    fn test_open_rejects_blank_id() {
        let mut c = controller();
        connect(&mut c, vec![]);
        assert_eq!(
            c.open_document("  "),
            Err(SyncError::InvalidDocumentId("  ".into()))
        );
    }

    #[test]
    fn test_open_not_found_keeps_draft() {
        let mut c = controller();
        connect(&mut c, vec![]);
        let original = doc("a1", "Groceries", "milk");
        open(&mut c, &original);
        c.edit_text("milk and bread").unwrap();
        let mut events = c.take_events();

        c.open_document("missing").unwrap();
        let ack = c.transport().last_ack_for(EVENT_OPEN).unwrap();
        reply(&mut c, ack, json!({"success": false, "message": "Documento não encontrado"}));

        assert_eq!(c.draft().text, "milk and bread");
        assert_eq!(c.open_document_id(), Some(&id("a1")));
        assert_eq!(c.navigation().current(), Some(id("a1")));
        assert_eq!(c.connection_state(), ConnectionState::Connected);
        assert!(drain(&mut events).contains(&SyncEvent::Error(SyncError::DocumentNotFound {
            id: "missing".into(),
            message: "Documento não encontrado".into(),
        })));
    }

    #[test]
    fn test_save_new_document() {
        let mut c = controller();
        connect(&mut c, vec![]);
        c.transport.take_sent();

        c.edit_title("Hi");
        c.edit_text("ab").unwrap();
        c.transport.take_sent();
        c.save().unwrap();

        assert_eq!(
            c.transport().events(),
            vec![ClientEvent::Save(SavePayload {
                document_id: None,
                title: "Hi".into(),
                text: "ab".into(),
            })]
        );
        // Snapshot waits for the server
        assert_eq!(c.snapshot(), &DocumentContent::default());
        assert_eq!(c.open_document_id(), None);
    }

    #[test]
    fn test_save_trims_before_sending() {
        let mut c = controller();
        connect(&mut c, vec![]);
        c.edit_title("  Groceries ");
        c.edit_text(" milk ").unwrap();
        c.transport.take_sent();

        c.save().unwrap();
        let ClientEvent::Save(payload) = &c.transport().events()[0] else {
            panic!("Expected save");
        };
        assert_eq!(payload.title, "Groceries");
        assert_eq!(payload.text, "milk");
    }

    #[test]
    fn test_save_confirmation_opens_new_document() {
        let mut c = controller();
        connect(&mut c, vec![doc("old", "Older", "text")]);
        c.edit_title("Hi");
        c.edit_text("ab").unwrap();
        c.save().unwrap();
        let mut events = c.take_events();

        let saved = doc("new1", "Hi", "ab");
        c.handle_event(list_push(vec![doc("old", "Older", "text"), saved.clone()]));

        assert_eq!(c.documents().len(), 2);
        assert_eq!(c.open_document_id(), Some(&id("new1")));
        assert_eq!(c.snapshot(), &saved.content());
        assert_eq!(c.navigation().current(), Some(id("new1")));
        assert_eq!(c.state(), SessionState::DocumentOpen);
        assert!(drain(&mut events).contains(&SyncEvent::DocumentSaved(saved)));
    }

    #[test]
    fn test_save_of_open_document_carries_id() {
        let mut c = controller();
        connect(&mut c, vec![]);
        let original = doc("a1", "Groceries", "milk");
        open(&mut c, &original);
        c.edit_text("milk eggs").unwrap();
        c.transport.take_sent();

        c.save().unwrap();
        let ClientEvent::Save(payload) = &c.transport().events()[0] else {
            panic!("Expected save");
        };
        assert_eq!(payload.document_id, Some(id("a1")));

        // Confirmation picks the overwritten document, not the last entry
        let updated = doc("a1", "Groceries", "milk eggs");
        c.handle_event(list_push(vec![updated.clone(), doc("z", "Zeta", "last")]));
        assert_eq!(c.open_document_id(), Some(&id("a1")));
        assert_eq!(c.snapshot(), &updated.content());
        assert!(!c.is_dirty());
    }

    #[test]
    fn test_unsolicited_push_without_pending_save() {
        let mut c = controller();
        connect(&mut c, vec![]);
        c.handle_event(list_push(vec![doc("x", "Other", "from elsewhere")]));

        assert_eq!(c.documents().len(), 1);
        assert_eq!(c.open_document_id(), None);
        assert_eq!(c.state(), SessionState::Connected);
    }

    #[test]
    fn test_save_rejected_keeps_list() {
        let mut c = controller();
        connect(&mut c, vec![doc("a", "One", "first")]);
        c.edit_title("Hi");
        c.edit_text("ab").unwrap();
        c.save().unwrap();
        let mut events = c.take_events();

        c.handle_event(TransportEvent::Message(ServerMessage::DocumentList(
            Reply::failed("Erro ao salvar"),
        )));

        assert_eq!(c.documents(), &[doc("a", "One", "first")]);
        assert!(drain(&mut events)
            .contains(&SyncEvent::Error(SyncError::SaveRejected("Erro ao salvar".into()))));
    }

    #[test]
    fn test_validation_failure_sends_nothing() {
        let mut c = controller();
        connect(&mut c, vec![]);
        c.transport.take_sent();

        c.edit_title("");
        c.draft.text = "x".into();
        let err = c.save().unwrap_err();

        let SyncError::Validation(errors) = err else {
            panic!("Expected validation error");
        };
        assert_eq!(
            errors.messages(),
            vec![
                "Título no mínimo 2 caracteres".to_string(),
                "Texto no mínimo 2 caracteres".to_string()
            ]
        );
        assert!(c.transport().sent.is_empty());
    }

    #[test]
    fn test_update_requires_open_document() {
        let mut c = controller();
        connect(&mut c, vec![]);
        c.edit_title("Hi");
        c.edit_text("ab").unwrap();
        assert_eq!(c.update(), Err(SyncError::NoOpenDocument));
    }

    #[test]
    fn test_update_confirmation_moves_snapshot() {
        let mut c = controller();
        connect(&mut c, vec![]);
        open(&mut c, &doc("a1", "Groceries", "milk"));
        c.edit_text("milk eggs").unwrap();
        c.update().unwrap();
        assert!(c.is_dirty());
        let mut events = c.take_events();

        c.handle_event(TransportEvent::Message(ServerMessage::DocumentUpdate(
            Reply::ok(vec![doc("a1", "Groceries", "milk eggs")]),
        )));

        assert!(!c.is_dirty());
        assert!(drain(&mut events).contains(&SyncEvent::DocumentUpdated(Some(id("a1")))));
    }

    #[test]
    fn test_update_rejected() {
        let mut c = controller();
        connect(&mut c, vec![]);
        open(&mut c, &doc("a1", "Groceries", "milk"));
        c.edit_text("milk eggs").unwrap();
        c.update().unwrap();
        let mut events = c.take_events();

        c.handle_event(TransportEvent::Message(ServerMessage::DocumentUpdate(
            Reply::failed("sem permissão"),
        )));

        assert!(c.is_dirty());
        assert!(drain(&mut events)
            .contains(&SyncEvent::Error(SyncError::UpdateRejected("sem permissão".into()))));
    }

    #[test]
    fn test_remote_edit_overwrites_draft() {
        let mut c = controller();
        connect(&mut c, vec![]);
        c.edit_text("goodbye").unwrap();

        c.handle_event(TransportEvent::Message(ServerMessage::EditorChange(
            "hello".into(),
        )));
        assert_eq!(c.draft().text, "hello");
    }

    #[test]
    fn test_local_edit_broadcasts_full_text() {
        let mut c = controller();
        connect(&mut c, vec![]);
        c.transport.take_sent();

        c.edit_text("first line").unwrap();
        c.edit_text("first line\nsecond").unwrap();
        c.edit_title("no broadcast");

        assert_eq!(
            c.transport().events(),
            vec![
                ClientEvent::EditorChange("first line".into()),
                ClientEvent::EditorChange("first line\nsecond".into()),
            ]
        );
    }

    #[test]
    fn test_new_document_when_clean() {
        let mut c = controller();
        connect(&mut c, vec![]);
        open(&mut c, &doc("a1", "Groceries", "milk"));

        assert_eq!(c.new_document(), LeaveOutcome::Left);
        assert_eq!(c.open_document_id(), None);
        assert_eq!(c.draft(), &DocumentContent::default());
        assert_eq!(c.navigation().current(), None);
        assert_eq!(c.state(), SessionState::Connected);
    }

    #[test]
    fn test_gate_cancel_changes_nothing() {
        let mut c = controller();
        connect(&mut c, vec![]);
        open(&mut c, &doc("a1", "Groceries", "milk"));
        c.edit_title("Groceries!");
        let mut events = c.take_events();

        assert_eq!(c.new_document(), LeaveOutcome::ConfirmationRequired);
        // Asking again while pending does not prompt twice
        assert_eq!(c.new_document(), LeaveOutcome::ConfirmationRequired);
        let prompts = drain(&mut events)
            .into_iter()
            .filter(|e| *e == SyncEvent::LeaveConfirmationRequired)
            .count();
        assert_eq!(prompts, 1);

        assert_eq!(
            c.resolve_leave(LeaveChoice::Cancel),
            Ok(LeaveOutcome::Cancelled)
        );
        assert_eq!(c.draft().title, "Groceries!");
        assert_eq!(c.snapshot().title, "Groceries");
        assert_eq!(c.open_document_id(), Some(&id("a1")));
        assert_eq!(c.navigation().current(), Some(id("a1")));
        assert!(!c.awaiting_confirmation());
    }

    #[test]
    fn test_gate_discard() {
        let mut c = controller();
        connect(&mut c, vec![]);
        open(&mut c, &doc("a1", "Groceries", "milk"));
        c.edit_text("milk and more").unwrap();
        c.transport.take_sent();

        let mut asked = 0;
        let outcome = c
            .new_document_with(&mut |_: &DocumentContent| {
                asked += 1;
                LeaveChoice::Discard
            })
            .unwrap();

        assert_eq!(outcome, LeaveOutcome::Left);
        assert_eq!(asked, 1);
        assert!(c.transport().sent.is_empty());
        assert_eq!(c.open_document_id(), None);
        assert_eq!(c.navigation().current(), None);
    }

    #[test]
    fn test_gate_save_and_leave_updates() {
        let mut c = controller();
        connect(&mut c, vec![]);
        open(&mut c, &doc("a1", "Groceries", "milk"));
        c.edit_text("milk eggs").unwrap();
        c.transport.take_sent();

        assert_eq!(c.new_document(), LeaveOutcome::ConfirmationRequired);
        assert_eq!(
            c.resolve_leave(LeaveChoice::SaveAndLeave),
            Ok(LeaveOutcome::Left)
        );

        assert_eq!(
            c.transport().events(),
            vec![ClientEvent::Update(UpdatePayload {
                document_id: id("a1"),
                title: "Groceries".into(),
                text: "milk eggs".into(),
            })]
        );
        assert_eq!(c.open_document_id(), None);
        assert_eq!(c.draft(), &DocumentContent::default());

        // The confirmation does not reopen anything
        c.handle_event(TransportEvent::Message(ServerMessage::DocumentUpdate(
            Reply::ok(vec![doc("a1", "Groceries", "milk eggs")]),
        )));
        assert_eq!(c.open_document_id(), None);
    }

    #[test]
    fn test_gate_save_and_leave_unsaved_draft() {
        let mut c = controller();
        connect(&mut c, vec![]);
        c.edit_title("Fresh");
        c.edit_text("new text").unwrap();
        c.transport.take_sent();

        c.new_document_with(&mut |_: &DocumentContent| LeaveChoice::SaveAndLeave)
            .unwrap();
        assert!(matches!(c.transport().events()[0], ClientEvent::Save(_)));

        // Confirmation of a save made while leaving does not reopen it
        c.handle_event(list_push(vec![doc("f1", "Fresh", "new text")]));
        assert_eq!(c.open_document_id(), None);
        assert_eq!(c.draft(), &DocumentContent::default());
    }

    #[test]
    fn test_gate_save_and_leave_invalid_stays() {
        let mut c = controller();
        connect(&mut c, vec![]);
        open(&mut c, &doc("a1", "Groceries", "milk"));
        c.edit_text("").unwrap();

        assert_eq!(c.new_document(), LeaveOutcome::ConfirmationRequired);
        let result = c.resolve_leave(LeaveChoice::SaveAndLeave);

        assert!(matches!(result, Err(SyncError::Validation(_))));
        assert_eq!(c.open_document_id(), Some(&id("a1")));
        assert!(!c.awaiting_confirmation());
    }

    #[test]
    fn test_resolve_without_prompt() {
        let mut c = controller();
        assert_eq!(
            c.resolve_leave(LeaveChoice::Discard),
            Err(SyncError::NoPendingConfirmation)
        );
    }

    #[test]
    fn test_disconnect_keeps_known_good_state() {
        let mut c = controller();
        connect(&mut c, vec![doc("a1", "Groceries", "milk")]);
        open(&mut c, &doc("a1", "Groceries", "milk"));
        c.edit_text("milk eggs").unwrap();
        c.update().unwrap();

        c.handle_event(TransportEvent::Disconnected {
            reason: Some("connection reset".into()),
        });

        assert_eq!(c.connection_state(), ConnectionState::Disconnected);
        assert_eq!(c.state(), SessionState::AwaitingConnection);
        assert_eq!(c.draft().text, "milk eggs");
        assert_eq!(c.documents().len(), 1);

        // The in-flight update was lost with the connection
        c.handle_event(TransportEvent::Connected);
        c.handle_event(TransportEvent::Message(ServerMessage::DocumentUpdate(
            Reply::ok(vec![doc("a1", "Groceries", "milk eggs")]),
        )));
        assert!(c.is_dirty());
    }

    #[test]
    fn test_reconnect_reissues_list() {
        let mut c = controller();
        connect(&mut c, vec![]);
        open(&mut c, &doc("a1", "Groceries", "milk"));
        c.transport.take_sent();

        c.handle_event(TransportEvent::Disconnected { reason: None });
        c.handle_event(TransportEvent::Connecting);
        c.handle_event(TransportEvent::Connected);

        assert_eq!(c.state(), SessionState::DocumentOpen);
        assert_eq!(c.transport().events(), vec![ClientEvent::List]);
    }

    #[test]
    fn test_stale_reply_after_reconnect_is_ignored() {
        let mut c = controller();
        connect(&mut c, vec![]);
        c.open_document("a1").unwrap();
        let stale = c.transport().last_ack_for(EVENT_OPEN).unwrap();

        c.handle_event(TransportEvent::Disconnected { reason: None });
        c.handle_event(TransportEvent::Connected);
        reply(&mut c, stale, json!({"success": true, "data": doc("a1", "T1", "xx")}));

        assert_eq!(c.open_document_id(), None);
    }

    #[test]
    fn test_navigation_restore_on_connect() {
        let mut c = SyncController::new(
            RecordingTransport::new(),
            navigation("http://app.test/?doc=restored"),
        );
        c.begin_authentication();
        c.token_received(Ok(AccessToken::new("token")));
        c.handle_event(TransportEvent::Connected);

        assert_eq!(
            c.transport().events(),
            vec![
                ClientEvent::List,
                ClientEvent::Open {
                    id: id("restored")
                }
            ]
        );

        let document = doc("restored", "Back", "again");
        let ack = c.transport().last_ack_for(EVENT_OPEN).unwrap();
        reply(&mut c, ack, json!({"success": true, "data": document}));
        assert_eq!(c.draft(), &document.content());
    }

    #[test]
    fn test_restore_not_found_clears_navigation() {
        let mut c = SyncController::new(
            RecordingTransport::new(),
            navigation("http://app.test/?doc=gone"),
        );
        c.begin_authentication();
        c.token_received(Ok(AccessToken::new("token")));
        c.handle_event(TransportEvent::Connected);

        let ack = c.transport().last_ack_for(EVENT_OPEN).unwrap();
        reply(&mut c, ack, json!({"success": false, "message": "not found"}));

        assert_eq!(c.navigation().current(), None);
        assert_eq!(c.navigation().location().as_str(), "http://app.test/");
    }

    #[test]
    fn test_mount_and_unmount_are_symmetric() {
        let mut c = controller();
        let _subscription = c.mount();
        assert!(c.is_mounted());
        assert_eq!(c.transport().subscriber_count(), 1);

        // Mounting twice does not leak a handler
        let _subscription = c.mount();
        assert_eq!(c.transport().subscriber_count(), 1);

        c.unmount();
        assert!(!c.is_mounted());
        assert_eq!(c.transport().subscriber_count(), 0);
    }

    #[test]
    fn test_subscription_receives_transport_events() {
        let mut c = controller();
        let mut subscription = c.mount();
        c.transport().deliver(TransportEvent::Connecting);

        let event = subscription.try_recv().unwrap();
        c.handle_event(event);
        assert_eq!(c.connection_state(), ConnectionState::Connecting);
    }

    #[test]
    fn test_explicit_disconnect() {
        let mut c = controller();
        connect(&mut c, vec![]);
        c.disconnect();

        assert_eq!(c.state(), SessionState::Unauthenticated);
        assert_eq!(c.connection_state(), ConnectionState::Disconnected);
        assert_eq!(c.transport().disconnects, 1);
        assert!(c.transport().connection().is_none());
    }

    #[test]
    fn test_view_snapshot() {
        let mut c = controller();
        connect(&mut c, vec![doc("a1", "Groceries", "milk")]);
        open(&mut c, &doc("a1", "Groceries", "milk"));
        c.edit_title("Groceries 2");

        let view = c.view();
        assert_eq!(view.state, SessionState::DocumentOpen);
        assert_eq!(view.connection, ConnectionState::Connected);
        assert!(view.dirty);
        assert_eq!(view.documents.len(), 1);
        assert_eq!(view.open_document, Some(id("a1")));
    }

    #[test]
    fn test_take_events_twice_reopens_channel() {
        let mut c = controller();
        let mut first = c.take_events();
        let mut second = c.take_events();

        c.begin_authentication();
        assert!(first.try_recv().is_err());
        assert_eq!(
            second.try_recv().ok(),
            Some(SyncEvent::StateChanged(SessionState::Authenticating))
        );
    }
}
