//! Prompt rendering for the generative engine.
//!
//! Builders are pure and deterministic: identical inputs yield
//! byte-identical text. Each prompt embeds the negotiation context in a
//! fixed XML-ish wrapper the engine is instructed to read, anchors the
//! output shape with exactly one worked example, and demands bare JSON.
//! The strict variants append a single reinforcement line and are used
//! only on the retry attempt.

use crate::domain::negotiation::{NegotiationContext, Proposal, Strategy};

pub const SYSTEM_PROMPT: &str = "You are an expert negotiation consultant with 20+ years of \
experience in B2B vendor negotiations.\n\
\n\
Your expertise includes:\n\
- SaaS and technology service negotiations\n\
- Understanding vendor psychology and business pressures\n\
- Crafting persuasive yet respectful communication\n\
- Balancing relationship preservation with cost savings\n\
- Recognizing negotiation leverage and timing\n\
\n\
Always return ONLY valid JSON when requested. Do not include any prose outside JSON.";

pub const VENDOR_SYSTEM_PROMPT: &str = "You are simulating a vendor's response to a \
negotiation. Be realistic and consider business factors.";

/// Which wire contract a prompt targets; selects the key list for the
/// strict reinforcement line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PromptKind {
    Proposal,
    VendorReply,
}

impl PromptKind {
    fn required_keys(self) -> &'static str {
        match self {
            Self::Proposal => "proposal, reasoning, expected_outcome",
            Self::VendorReply => "response, accepted_price, reasoning, success",
        }
    }
}

pub fn build_proposal_prompt(context: &NegotiationContext, strategy: Strategy) -> String {
    format!(
        "Analyze this negotiation scenario and generate a proposal following the specified \
         strategy.\n\
         \n\
         <context>\n{context_block}</context>\n\
         \n\
         <strategy>\n{strategy}\n</strategy>\n\
         \n\
         <instructions>\n\
         Your response must be a JSON object with the following structure:\n\
         ```json\n\
         {{\n\
             \"proposal\": \"The full text of the negotiation proposal.\",\n\
             \"reasoning\": \"The strategic reasoning behind this proposal.\",\n\
             \"expected_outcome\": \"What outcome is expected from this approach.\"\n\
         }}\n\
         ```\n\
         Return ONLY JSON with keys: proposal, reasoning, expected_outcome.\n\
         Keep proposal under 140 words. No invented facts.\n\
         </instructions>\n\
         \n\
         <example>\n\
           <input>\n\
             <context>Vendor is increasing the price from $500 to $600.</context>\n\
             <strategy>polite</strategy>\n\
           </input>\n\
           <output>\n\
           ```json\n\
           {{\n\
               \"proposal\": \"We'd like to propose a renewal at $525/month.\",\n\
               \"reasoning\": \"A polite opening with a modest counter-offer.\",\n\
               \"expected_outcome\": \"The vendor is likely to accept or provide a further \
         discount.\"\n\
           }}\n\
           ```\n\
           </output>\n\
         </example>",
        context_block = format_context(context),
        strategy = strategy.as_str(),
    )
}

pub fn build_vendor_prompt(context: &NegotiationContext, proposal: &Proposal) -> String {
    format!(
        "You are simulating a realistic vendor response to a negotiation attempt.\n\
         \n\
         <context>\n\
           <vendor_message>{vendor_message}</vendor_message>\n\
           <customer_proposal>{proposal}</customer_proposal>\n\
           <original_price>${past_price}/month</original_price>\n\
           <target_price>${target_price}/month</target_price>\n\
           <service_type>{service_type}</service_type>\n\
           <relationship_length>{relationship}</relationship_length>\n\
         </context>\n\
         \n\
         <instructions>\n\
           As a vendor, consider the following:\n\
           - Your margins and flexibility.\n\
           - The customer's value and the importance of retention.\n\
           - Competitive pressure and market rates.\n\
           - The length of the relationship and customer loyalty.\n\
           - Business pressures (e.g., end of quarter).\n\
         \n\
           Your response must be a JSON object with the following structure:\n\
           ```json\n\
           {{\n\
               \"response\": \"The vendor's email reply\",\n\
               \"accepted_price\": 450,\n\
               \"reasoning\": \"Why the vendor made this decision\",\n\
               \"success\": true\n\
           }}\n\
           ```\n\
         \n\
           Be realistic. Vendors typically concede 15-35% on the first reply; avoid going \
         below target on the first hop unless justified.\n\
         </instructions>\n\
         \n\
         <example>\n\
           <input>\n\
             <vendor_message>Your renewal is coming up at $1000/month.</vendor_message>\n\
             <customer_proposal>We're looking for a rate closer to $800/month.</customer_proposal>\n\
           </input>\n\
           <output>\n\
           ```json\n\
           {{\n\
               \"response\": \"Thanks for reaching out. We can offer a discounted rate of \
         $900/month.\",\n\
               \"accepted_price\": 900,\n\
               \"reasoning\": \"Offered a 10% discount to retain a valued customer.\",\n\
               \"success\": true\n\
           }}\n\
           ```\n\
           </output>\n\
         </example>",
        vendor_message = context.vendor_message,
        proposal = proposal.content,
        past_price = context.past_price,
        target_price = context.target_price,
        service_type = context.service_type,
        relationship = context.relationship,
    )
}

/// Appends the one-line format reinforcement used on the second attempt.
/// Nothing about the content ask changes, only the output-shape constraint.
pub fn strict_variant(prompt: &str, kind: PromptKind) -> String {
    format!(
        "{prompt}\n\nIMPORTANT: Return ONLY valid JSON with keys: {keys}. No other text.",
        keys = kind.required_keys(),
    )
}

fn format_context(context: &NegotiationContext) -> String {
    format!(
        "<vendor_message>{vendor_message}</vendor_message>\n\
         <current_price>${past_price}/month</current_price>\n\
         <target_price>${target_price}/month</target_price>\n\
         <service_type>{service_type}</service_type>\n\
         <relationship_length>{relationship}</relationship_length>\n",
        vendor_message = context.vendor_message,
        past_price = context.past_price,
        target_price = context.target_price,
        service_type = context.service_type,
        relationship = context.relationship,
    )
}
