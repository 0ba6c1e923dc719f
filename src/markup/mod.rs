pub mod fields;
pub mod ranges;
pub mod render;

use crate::model::{NormalizedRecord, RawMessage};
use ranges::SkippedRange;
use render::MarkupOptions;

pub struct Normalized {
    pub record: NormalizedRecord,
    pub skipped: Vec<SkippedRange>,
}

/// ranges → markdown → fields → record. Pure; safe to run in parallel.
pub fn normalize(message: &RawMessage, options: &MarkupOptions) -> Normalized {
    let (rendered, skipped) = match message.text.as_deref() {
        Some(text) => {
            let resolved = ranges::resolve(&message.ranges);
            let out = render::render(text, &resolved, options);
            (Some(out.text), out.skipped)
        }
        None => (None, Vec::new()),
    };

    let fields = fields::extract(rendered.as_deref());
    let record = NormalizedRecord {
        id: message.id,
        date: message.date,
        body: fields.body,
        media_kind: message.media_label(),
        photo_path: None,
        heading: fields.heading,
        tags: fields.tags,
    };
    Normalized { record, skipped }
}
