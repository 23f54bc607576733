/// Token usage accumulated over every `response.done` of a connection.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct Stats {
    responses: u32,
    total_tokens: u64,
    input_tokens: u64,
    output_tokens: u64,
}

impl Stats {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn update_usage(&mut self, total: u32, input: u32, output: u32) {
        self.responses += 1;
        self.total_tokens += u64::from(total);
        self.input_tokens += u64::from(input);
        self.output_tokens += u64::from(output);
    }

    pub fn responses(&self) -> u32 {
        self.responses
    }

    pub fn total_tokens(&self) -> u64 {
        self.total_tokens
    }

    pub fn input_tokens(&self) -> u64 {
        self.input_tokens
    }

    pub fn output_tokens(&self) -> u64 {
        self.output_tokens
    }
}
