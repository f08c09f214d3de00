//! Prompt templates for the Gemini research calls

const COMPANY_JSON_SHAPE: &str = r#"{
  "chain_of_thought": "How you reached the answer: listing status first, then the major owners, then the category.",
  "public_private": "Public or Private",
  "ownership_category": "One of: PE-Owned, Public (PE-Backed), Public (Institutional), Private (Founder/Family), Private (Other), Unknown",
  "pe_owner_names": ["Private equity firms holding the company, or an empty list"],
  "is_itself_pe": false,
  "nation": "Country of the headquarters",
  "ownership_summary": "One sentence describing the current ownership.",
  "uncertainties": ["Specific points you are unsure about, or an empty list"]
}"#;

const PORTFOLIO_JSON_SHAPE: &str = r#"{
  "profile_summary": "One paragraph on the firm, its investment focus and strategy.",
  "portfolio_companies": [
    { "name": "Company Name", "headquarters": "Country", "industry": "Primary Industry" }
  ]
}"#;

pub fn analyze_company(company_name: &str) -> String {
    format!(
        "Research the current corporate ownership of the company '{name}'.\n\
         Search for its official website, recent filings and news on its investors or acquirers, \
         and use what is true for the current year.\n\n\
         Return only a JSON object with exactly this structure:\n{shape}\n\n\
         If a reliable source does not give you a fact, answer 'Information not found' for it \
         instead of guessing.\n\n\
         Example for 'Garrett Motion Inc.': it trades on Nasdaq, so it is Public; its largest \
         holders include Oaktree Capital Management and Centerbridge Partners, so the category is \
         'Public (PE-Backed)' with both firms as pe_owner_names and Switzerland as the nation.\n\n\
         Now analyze '{name}'.",
        name = company_name,
        shape = COMPANY_JSON_SHAPE,
    )
}

pub fn company_correction(company_name: &str, previous_response: &str) -> String {
    format!(
        "Your previous answer about the company '{name}' was not valid JSON.\n\
         Rewrite it as ONLY a valid JSON object with this structure:\n{shape}\n\n\
         PREVIOUS ANSWER:\n{previous}\n\n\
         CORRECTED JSON ONLY:",
        name = company_name,
        shape = COMPANY_JSON_SHAPE,
        previous = previous_response,
    )
}

pub fn research_pe_portfolio(firm_name: &str) -> String {
    format!(
        "Profile the private equity firm '{name}' and list the companies it currently holds.\n\
         Leave out investments the firm has already exited.\n\n\
         Return only a JSON object with exactly this structure:\n{shape}\n\n\
         Now research '{name}'.",
        name = firm_name,
        shape = PORTFOLIO_JSON_SHAPE,
    )
}

pub fn portfolio_correction(firm_name: &str, previous_response: &str) -> String {
    format!(
        "Your previous answer about the PE firm '{name}' was not valid JSON.\n\
         Rewrite it as ONLY a valid JSON object with this structure:\n{shape}\n\n\
         PREVIOUS ANSWER:\n{previous}\n\n\
         CORRECTED JSON ONLY:",
        name = firm_name,
        shape = PORTFOLIO_JSON_SHAPE,
        previous = previous_response,
    )
}
