pub const SYSTEM_PROMPT: &str = "\
You are an expert logistics data extractor. Your job is to extract specific shipment details from the provided documents.
You will receive:
1. Images of a Bill of Lading (PDF pages rendered as images).
2. Markdown text converted from a Packing List or Invoice (spreadsheet).

Task:
Analyze the documents and fill every field of the shipment schema.

The PDF images carry the Bill of Lading header data (BOL number, container, consignee, dates).
The spreadsheet text carries the line items and packing details. Cross-reference both to fill the schema.
Convert any date format you find (e.g. \"12 Jan 24\", \"2024/01/12\") to an ISO 8601 calendar date, YYYY-MM-DD.

Use the totals stated in the documents for 'total_gross_weight' and 'total_invoice_amount'.
Do NOT calculate averages.

If a field is missing or ambiguous, return null for it. Never invent placeholder values.
";

pub const EXTRACTION_TOOL_NAME: &str = "record_shipment_extraction";

pub const EXTRACTION_TOOL_DESCRIPTION: &str =
    "Record the shipment fields extracted from the Bill of Lading images and the packing list text.";

pub fn user_prompt(spreadsheet_markdown: &str) -> String {
    format!(
        "Here are the documents for extraction:\n\n\
         --- SPREADSHEET CONTENT (Markdown) ---\n\
         {spreadsheet_markdown}\n\
         --------------------------------------\n\n\
         --- PDF IMAGES ---\n\
         (See attached images)\n\
         ------------------\n"
    )
}

pub fn validation_feedback(error: &str) -> String {
    format!(
        "Your previous answer could not be validated against the schema: {error}\n\
         Call the tool again with values of the correct types, using null for anything you cannot find."
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_prompt_embeds_the_markdown_verbatim() {
        let prompt = user_prompt("| Item | Qty |\n| --- | --- |");
        assert!(prompt.contains("(Markdown) ---\n| Item | Qty |\n| --- | --- |\n---"));
        assert!(prompt.contains("(See attached images)"));
    }

    #[test]
    fn system_prompt_states_the_date_rule() {
        assert!(SYSTEM_PROMPT.contains("ISO 8601"));
    }
}
