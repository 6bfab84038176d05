#[derive(Clone)]
struct AppState {
    inner: Arc<Mutex<ServerInner>>,
    stream_tx: broadcast::Sender<StreamMessage>,
}

impl AppState {
    fn new(lobby: LobbyApi) -> Self {
        let (stream_tx, _) = broadcast::channel(4096);
        Self {
            inner: Arc::new(Mutex::new(ServerInner {
                lobby,
                emitted_sequence: 0,
            })),
            stream_tx,
        }
    }
}

#[derive(Debug)]
struct ServerInner {
    lobby: LobbyApi,
    /// Highest event sequence already pushed to stream subscribers.
    emitted_sequence: u64,
}

fn collect_new_events(inner: &mut ServerInner) -> Vec<StreamMessage> {
    let messages: Vec<StreamMessage> = inner
        .lobby
        .events_since(inner.emitted_sequence)
        .iter()
        .map(StreamMessage::event_appended)
        .collect();
    if let Some(last) = inner.lobby.events().last() {
        inner.emitted_sequence = last.sequence;
    }
    messages
}

fn broadcast_messages(state: &AppState, messages: Vec<StreamMessage>) {
    for message in messages {
        // No subscribers is not an error.
        let _ = state.stream_tx.send(message);
    }
}
