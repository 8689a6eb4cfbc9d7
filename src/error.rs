use thiserror::Error;

/// Errores de la capa de reproducción que se muestran al usuario.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlayerError {
    #[error("la posición {position} no existe (la cola tiene {len} canciones)")]
    OutOfRange { position: usize, len: usize },

    #[error("modo de repetición inválido `{0}` (usa off, all o single)")]
    InvalidMode(String),

    #[error("el volumen {0} está fuera del rango 0-100")]
    InvalidVolume(i64),

    #[error("no hay transporte de voz disponible")]
    TransportUnavailable,

    #[error("ya estoy conectado a un canal de voz")]
    AlreadyConnected,

    #[error("no estoy conectado a un canal de voz")]
    NotConnected,

    #[error("no se pudo conectar al canal de voz: {0}")]
    Connect(String),

    #[error("debes estar en un canal de voz")]
    NotInVoice,

    #[error("debes estar en el mismo canal de voz que yo")]
    NotSameVoice,

    #[error("los comandos solo se aceptan en <#{0}>")]
    WrongTextChannel(u64),
}

/// Fallo al resolver una canción.
///
/// `expected` marks failures that are a property of the content itself
/// (geo blocks, age gates, private or removed videos). Those are logged
/// quietly; anything else is treated as a provider problem.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ResolveError {
    pub expected: bool,
    pub message: String,
}

impl ResolveError {
    pub fn expected(message: impl Into<String>) -> Self {
        Self {
            expected: true,
            message: message.into(),
        }
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self {
            expected: false,
            message: message.into(),
        }
    }
}
