//! Prompt template for turning OCR text into a business-card record.
//!
//! Keeping the prompt here rather than inline in the model client makes it
//! easy to inspect from unit tests and to change without touching the
//! request pipeline.

/// Fields the model is asked to extract, in prompt order.
pub const CARD_FIELDS: [&str; 10] = [
    "name",
    "designation",
    "company_name",
    "emails",
    "phone_numbers",
    "address",
    "city",
    "country",
    "website",
    "slogan",
];

/// Instruction block sent ahead of the OCR text.
pub const EXTRACTION_INSTRUCTIONS: &str = r#"You are an intelligent assistant specialized in extracting structured JSON from business cards.

Instructions:
1. Extract fields: name, designation, company_name, emails, phone_numbers, address, city, country, website, slogan.
2. Each field must be an array, even if one value.
3. Remove irrelevant text like 'Company Logo'.
4. Combine multi-line addresses into one string.
5. Correct common OCR mistakes in emails/websites.
6. Return strictly valid JSON."#;

/// Build the full prompt for one card.
///
/// Both texts are interpolated verbatim between `"""` delimiters. OCR text that
/// itself contains `"""` will break the quoting; the model usually copes.
pub fn build_prompt(raw_text: &str, cleaned_text: &str) -> String {
    format!(
        "\n{EXTRACTION_INSTRUCTIONS}\n\nRaw OCR Text:\n\"\"\"{raw_text}\"\"\"\n\nCleaned Text:\n\"\"\"{cleaned_text}\"\"\"\n"
    )
}
