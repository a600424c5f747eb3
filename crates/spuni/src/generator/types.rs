//! Generator types.

/// Whether a streamed token came from the prompt or was generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenType {
    Prompt,
    Generated,
}

/// Token information yielded during streaming.
#[derive(Debug, Clone)]
pub struct StreamedToken {
    /// The newly decoded text for this token.
    pub text: String,
    /// The token id.
    pub id: u32,
    /// Prompt echo or generated token.
    pub token_type: TokenType,
}

/// Why the decoding loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The configured EOS token was generated (and appended to the output).
    EosToken,
    /// `max_new_tokens` generated tokens were reached.
    MaxNewTokens,
    /// The total sequence hit `max_length`.
    MaxLength,
    /// The caller cancelled; tokens generated so far are returned.
    Cancelled,
}

/// Lifecycle of a decoding session.
///
/// `Prefill` covers the first forward pass over the whole prompt; `Decode`
/// the per-token loop; `Stopped` is terminal, with no transitions back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Prefill,
    Decode,
    Stopped(StopReason),
}

/// The result of a completed generation call.
#[derive(Debug, Clone)]
pub struct GenerationOutput {
    /// The full token sequence: prompt followed by every generated token
    /// (including EOS when it triggered the stop).
    pub tokens: Vec<u32>,
    /// Decoded text of the generated suffix only.
    pub text: String,
    /// Number of generated tokens, prompt excluded.
    pub generated: usize,
    /// Why decoding stopped.
    pub stop_reason: StopReason,
}
