//! Context assembly from retrieved documents

use super::RetrievedDocument;
use crate::models::DocumentRef;

/// Builds the synthesis context from retrieved documents, best first
pub struct ContextAssembler {
    max_context_chars: usize,
}

impl ContextAssembler {
    #[must_use]
    pub const fn new(max_context_chars: usize) -> Self {
        Self { max_context_chars }
    }

    #[must_use]
    pub const fn max_context_chars(&self) -> usize {
        self.max_context_chars
    }

    /// Assemble context and the references of the documents that made it in
    ///
    /// Documents are added whole while they fit. The first document is cut at
    /// a char boundary if it alone exceeds the cap, as long as some of its
    /// content survives the cut; otherwise the context stays empty and no
    /// reference is reported.
    #[must_use]
    pub fn assemble(&self, documents: &[RetrievedDocument]) -> (String, Vec<DocumentRef>) {
        let mut context = String::new();
        let mut used = Vec::new();
        let mut total_chars = 0;

        for (idx, retrieved) in documents.iter().enumerate() {
            let header = Self::format_header(idx + 1, retrieved);
            let entry = format!("{header}{}\n", retrieved.document.content);
            let entry_chars = entry.chars().count();

            if total_chars + entry_chars > self.max_context_chars {
                if idx == 0 && self.max_context_chars > header.chars().count() {
                    context.extend(entry.chars().take(self.max_context_chars));
                    used.push(Self::reference(retrieved));
                }
                break;
            }

            context.push_str(&entry);
            total_chars += entry_chars;
            used.push(Self::reference(retrieved));
        }

        (context, used)
    }

    fn format_header(position: usize, retrieved: &RetrievedDocument) -> String {
        match &retrieved.document.title {
            Some(title) => format!(
                "\n[Document {position}] {title} (score {:.3})\n",
                retrieved.score
            ),
            None => format!("\n[Document {position}] (score {:.3})\n", retrieved.score),
        }
    }

    fn reference(retrieved: &RetrievedDocument) -> DocumentRef {
        DocumentRef {
            id: retrieved.document.id.clone(),
            title: retrieved.document.title.clone(),
            score: retrieved.score,
        }
    }
}

impl Default for ContextAssembler {
    fn default() -> Self {
        Self::new(12_000)
    }
}
