use crate::models::RetrievedChunk;

pub const DEFAULT_TEMPLATE: &str = "Answer the questions based on the provided context only.
Please provide the most accurate response based on the question
<context>
{context}
<context>
Question:{input}";

const CONTEXT_SLOT: &str = "{context}";
const INPUT_SLOT: &str = "{input}";

/// A prompt with `{context}` and `{input}` slots.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    template: String,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            template: DEFAULT_TEMPLATE.to_string(),
        }
    }
}

impl PromptTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    /// Retrieved chunk texts are joined with blank lines, in retrieval order.
    /// Slots are filled in a single pass over the template, so substituted
    /// text is never scanned for further slots.
    pub fn render(&self, context: &[RetrievedChunk], input: &str) -> String {
        let context = context
            .iter()
            .map(|retrieved| retrieved.chunk.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        let slots = [(CONTEXT_SLOT, context.as_str()), (INPUT_SLOT, input)];

        let mut rendered = String::with_capacity(self.template.len() + context.len() + input.len());
        let mut rest = self.template.as_str();
        loop {
            let next = slots
                .iter()
                .filter_map(|(slot, value)| rest.find(slot).map(|at| (at, *slot, *value)))
                .min_by_key(|(at, _, _)| *at);
            let Some((at, slot, value)) = next else {
                break;
            };
            rendered.push_str(&rest[..at]);
            rendered.push_str(value);
            rest = &rest[at + slot.len()..];
        }
        rendered.push_str(rest);
        rendered
    }
}
