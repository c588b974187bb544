/// Every fallible operation in the crate bubbles one of these up. Errors about
/// a particular chunk keep its identifier, and the driver tags errors with
/// the stage they came out of

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrataErr {
    message: String,
    chunk: Option<String>, // Identifier of the offending chunk
    stage: Option<String>, // Stage that was running
}

impl StrataErr {
    pub fn from(message: &str) -> Self {
        StrataErr {
            message: message.to_string(),
            chunk: None,
            stage: None,
        }
    }

    /// Error about the chunk with identifier `id`
    pub fn at_chunk(id: &str, message: &str) -> Self {
        StrataErr {
            chunk: Some(id.to_string()),
            ..StrataErr::from(message)
        }
    }

    /// Tag the error with the stage it surfaced in, an existing tag wins
    pub fn in_stage(mut self, stage: &str) -> Self {
        if self.stage.is_none() {
            self.stage = Some(stage.to_string());
        }
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn chunk(&self) -> Option<&str> {
        self.chunk.as_deref()
    }

    pub fn stage(&self) -> Option<&str> {
        self.stage.as_deref()
    }

    pub fn display(&self) {
        println!("{}", self);
    }
}

impl std::fmt::Display for StrataErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(stage) = &self.stage {
            write!(f, "[{}] ", stage)?;
        }

        match &self.chunk {
            Some(id) => write!(f, "'{}': {}", id, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for StrataErr {}
