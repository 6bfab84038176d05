fn apply_cors_headers(headers: &mut axum::http::HeaderMap) {
    headers.insert(
        HeaderName::from_static("access-control-allow-origin"),
        HeaderValue::from_static("*"),
    );
    headers.insert(
        HeaderName::from_static("access-control-allow-methods"),
        HeaderValue::from_static("GET,POST,DELETE,OPTIONS"),
    );
    headers.insert(
        HeaderName::from_static("access-control-allow-headers"),
        HeaderValue::from_static("*"),
    );
}

/// Runs `f` under the lobby lock, then streams whatever events it appended,
/// including when `f` fails.
async fn with_lobby<T, F>(state: &AppState, f: F) -> Result<T, HttpApiError>
where
    F: FnOnce(&mut LobbyApi) -> Result<T, LobbyError> + Send,
    T: Send,
{
    let (result, messages) = {
        let mut inner = state.inner.lock().await;
        let result = f(&mut inner.lobby);
        let messages = collect_new_events(&mut inner);
        (result, messages)
    };
    broadcast_messages(state, messages);
    result.map_err(HttpApiError::from_lobby)
}

fn last_sequence(lobby: &LobbyApi) -> u64 {
    lobby.events().last().map(|event| event.sequence).unwrap_or(0)
}
