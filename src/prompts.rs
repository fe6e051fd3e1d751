//! Prompts for page annotation.
//!
//! The extractor looks for the first ```` ```html ```` fenced block in each
//! reply, so whatever prompt is used must ask the model to put its markup in
//! exactly such a block. The default here does; custom prompts supplied via
//! [`crate::config::PipelineConfig::prompt`] are used verbatim.

/// Default prompt sent alongside every page image.
pub const DEFAULT_PROMPT: &str = r#"You are an expert document converter. The attached image is one page of a PDF document. Reproduce the page as clean, semantic HTML.

Follow these rules precisely:

1. TEXT PRESERVATION
   - Preserve ALL text content completely and accurately
   - Keep the reading order a human would follow on this page

2. STRUCTURE
   - Use <h1>–<h4> for headings according to their visual hierarchy
   - Use <p> for paragraphs, <ul>/<ol>/<li> for lists
   - Use <strong> and <em> to match visual emphasis

3. TABLES
   - Reproduce tables with <table>, <thead>, <tbody>, <tr>, <th>, <td>
   - Preserve merged cells with rowspan/colspan

4. FORMULAS AND FIGURES
   - Write formulas as MathML or plain text when MathML is not possible
   - Describe figures briefly inside <figure><figcaption>

5. WHAT TO IGNORE
   - Running headers, footers and page numbers
   - Decorative lines that carry no content

6. OUTPUT FORMAT
   - Emit a page fragment only: no <html>, <head> or <body> elements
   - Put the whole fragment in ONE fenced block that starts with ```html on its own line and ends with ```
   - Do not add commentary outside the fenced block"#;
