use core::fmt::Display;

/// Holds the context for the current operation. Used for prefixing logs.
#[derive(Default, Debug, Clone)]
pub struct Context {
    /// The backend being operated on.
    pub backend: Option<String>,
    /// The dataset being operated on.
    pub dataset: Option<String>,
    /// The current stage.
    pub current_context: &'static str,
}

impl Context {
    /// A context for a pipeline stage.
    pub fn stage(current_context: &'static str) -> Self {
        Self {
            current_context,
            ..Self::default()
        }
    }
}

impl Display for Context {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        if let Some(backend) = &self.backend {
            write!(f, "[{backend}] ")?;
        }

        if let Some(dataset) = &self.dataset {
            write!(f, "[{dataset}] ")?;
        }

        write!(f, "[{}] ", self.current_context)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::Context;

    #[test]
    fn prefix() {
        let mut context = Context::stage("Rotate");
        assert_eq!(context.to_string(), "[Rotate] ");

        context.backend = Some("ftp".to_string());
        context.dataset = Some("orders".to_string());
        assert_eq!(context.to_string(), "[ftp] [orders] [Rotate] ");
    }
}
