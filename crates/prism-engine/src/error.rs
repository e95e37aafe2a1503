use std::fmt;

pub type Result<T> = std::result::Result<T, EffectError>;

/// Compilation stage that produced a shader diagnostic.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum CompileStage {
    Vertex,
    Fragment,
    /// Cross-stage checks performed while linking the two stages.
    Link,
}

impl fmt::Display for CompileStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CompileStage::Vertex => "vertex",
            CompileStage::Fragment => "fragment",
            CompileStage::Link => "link",
        })
    }
}

#[derive(thiserror::Error, Debug)]
pub enum EffectError {
    /// Shader source failed to parse, validate or link. `log` is the compiler diagnostic.
    #[error("{stage} shader error: {log}")]
    ShaderCompile { stage: CompileStage, log: String },

    /// A GPU operation was attempted without the right context being current.
    #[error("context state error: {0}")]
    ContextState(String),

    /// A render target or texture could not be allocated.
    #[error("resource unavailable: {0}")]
    ResourceUnavailable(String),

    #[error("effect is not linked")]
    NotLinked,

    #[error("effect is already linked")]
    AlreadyLinked,

    #[error("shader source not found: {0}")]
    SourceNotFound(String),

    #[error("uniform `{name}`: {reason}")]
    Uniform { name: String, reason: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl EffectError {
    pub fn compile(stage: CompileStage, log: impl Into<String>) -> Self {
        Self::ShaderCompile {
            stage,
            log: log.into(),
        }
    }

    pub fn context_state(msg: impl Into<String>) -> Self {
        Self::ContextState(msg.into())
    }

    pub fn resource(msg: impl Into<String>) -> Self {
        Self::ResourceUnavailable(msg.into())
    }

    pub fn uniform(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Uniform {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Per-frame failures are dropped at the frame boundary; everything else
    /// is a programming or construction error.
    pub fn is_transient(&self) -> bool {
        matches!(self, EffectError::ResourceUnavailable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compile_error_carries_stage_and_log() {
        let err = EffectError::compile(CompileStage::Fragment, "expected `;`");
        let text = err.to_string();
        assert!(text.starts_with("fragment shader error:"));
        assert!(text.contains("expected `;`"));
    }

    #[test]
    fn only_resource_errors_are_transient() {
        assert!(EffectError::resource("zero-sized target").is_transient());
        assert!(!EffectError::context_state("not current").is_transient());
        assert!(!EffectError::NotLinked.is_transient());
    }

    #[test]
    fn other_preserves_source() {
        let err = EffectError::Other(anyhow::anyhow!("boom"));
        assert!(err.to_string().contains("boom"));
    }
}
