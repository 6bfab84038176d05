#[derive(Debug, Error)]
pub enum ServerError {
    #[error("server io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug)]
struct HttpApiError {
    status: StatusCode,
    error: ApiError,
}

impl HttpApiError {
    fn invalid_input(message: impl Into<String>, details: Option<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            error: ApiError::new(ErrorCode::InvalidInput, message, details),
        }
    }

    fn from_lobby(err: LobbyError) -> Self {
        let details = Some(err.to_string());
        match err {
            LobbyError::PlayerNotFound { .. } => Self {
                status: StatusCode::NOT_FOUND,
                error: ApiError::new(ErrorCode::PlayerNotFound, "player is not in the lobby", details),
            },
            LobbyError::PlayerAlreadyJoined { .. } => Self {
                status: StatusCode::CONFLICT,
                error: ApiError::new(ErrorCode::PlayerAlreadyJoined, "player already joined", details),
            },
            LobbyError::RoundInProgress { .. } => Self {
                status: StatusCode::CONFLICT,
                error: ApiError::new(ErrorCode::RoundStateConflict, "a round is already in progress", details),
            },
            LobbyError::HostCannotLeave
            | LobbyError::UnknownLocation { .. }
            | LobbyError::InvalidInput(_) => Self::invalid_input("request rejected", details),
            LobbyError::UnsupportedSchema { .. } => Self {
                status: StatusCode::BAD_REQUEST,
                error: ApiError::new(
                    ErrorCode::ContractVersionUnsupported,
                    "unsupported schema_version",
                    details,
                ),
            },
            LobbyError::Settings(SettingsError::OutOfRange { .. }) => Self {
                status: StatusCode::BAD_REQUEST,
                error: ApiError::new(ErrorCode::InvalidSetting, "setting is out of range", details),
            },
            LobbyError::Settings(SettingsError::UnknownCategory { .. }) => Self {
                status: StatusCode::BAD_REQUEST,
                error: ApiError::new(ErrorCode::InvalidSetting, "category is not in the catalogue", details),
            },
            LobbyError::Settings(SettingsError::NotAuthority { .. }) => Self {
                status: StatusCode::FORBIDDEN,
                error: ApiError::new(ErrorCode::NotAuthority, "only the host can change settings", details),
            },
            LobbyError::Selection(_) => Self {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                error: ApiError::new(ErrorCode::InternalError, "round selection failed", details),
            },
        }
    }
}

impl IntoResponse for HttpApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.error)).into_response()
    }
}
