//! Base de conocimiento estática: riesgo, severidad y fuente por tipo de cláusula.

use crate::models::{ClauseType, Severity};

#[derive(Debug)]
pub struct KnowledgeEntry {
    pub risk_text: &'static str,
    pub severity: Severity,
    pub source_citation: &'static str,
    pub trigger_examples: &'static [&'static str],
}

static ANTI_ASSIGNMENT: KnowledgeEntry = KnowledgeEntry {
    risk_text: "Assignment clauses without consent allow the other party to transfer the contract to anyone without your approval. This is risky because you could end up doing business with a stranger or a company you never agreed to work with.",
    severity: Severity::High,
    source_citation: "Contract Law Best Practices",
    trigger_examples: &["without consent", "freely assignable", "no restriction"],
};

static GOVERNING_LAW: KnowledgeEntry = KnowledgeEntry {
    risk_text: "Governing law clauses determine which state's laws apply to disputes. If the clause favors the other party's jurisdiction, you may face higher legal costs and less favorable legal precedents.",
    severity: Severity::High,
    source_citation: "Legal Jurisdiction Guidelines",
    trigger_examples: &["laws of [state]", "governed by", "jurisdiction"],
};

static TERMINATION: KnowledgeEntry = KnowledgeEntry {
    risk_text: "Termination clauses without proper notice periods or termination for convenience can lock you into bad contracts. Without termination rights, you may be stuck with an unprofitable or problematic agreement.",
    severity: Severity::High,
    source_citation: "Contract Termination Best Practices",
    trigger_examples: &["no termination", "automatic renewal", "perpetual"],
};

static CONFIDENTIALITY: KnowledgeEntry = KnowledgeEntry {
    risk_text: "Weak confidentiality clauses may not protect your sensitive business information. Broad disclosure exceptions or short confidentiality periods can expose trade secrets and competitive advantages.",
    severity: Severity::Medium,
    source_citation: "Intellectual Property Protection Guidelines",
    trigger_examples: &["public information", "general knowledge", "short duration"],
};

static INDEMNIFICATION: KnowledgeEntry = KnowledgeEntry {
    risk_text: "Broad indemnification clauses can create unlimited liability for your company. You may be required to pay for the other party's legal costs and damages even for their own mistakes or negligence.",
    severity: Severity::High,
    source_citation: "Liability Management Standards",
    trigger_examples: &["hold harmless", "defend and indemnify", "all claims"],
};

static FORCE_MAJEURE: KnowledgeEntry = KnowledgeEntry {
    risk_text: "Vague force majeure clauses may not protect you during unexpected events. If the clause is too narrow or doesn't include relevant events, you may still be liable for performance during disruptions.",
    severity: Severity::Medium,
    source_citation: "Risk Management Guidelines",
    trigger_examples: &["act of god", "beyond control", "unforeseeable"],
};

impl KnowledgeEntry {
    /// Primer ejemplo de redacción de riesgo que aparece en el texto dado.
    pub fn matching_trigger(&self, text: &str) -> Option<&'static str> {
        let lower = text.to_lowercase();
        self.trigger_examples
            .iter()
            .copied()
            .find(|example| lower.contains(example))
    }
}

/// Entrada de riesgo para un tipo de cláusula, si existe.
pub fn lookup(clause_type: ClauseType) -> Option<&'static KnowledgeEntry> {
    match clause_type {
        ClauseType::AntiAssignment => Some(&ANTI_ASSIGNMENT),
        ClauseType::GoverningLaw => Some(&GOVERNING_LAW),
        ClauseType::Termination => Some(&TERMINATION),
        ClauseType::Confidentiality => Some(&CONFIDENTIALITY),
        ClauseType::Indemnification => Some(&INDEMNIFICATION),
        ClauseType::ForceMajeure => Some(&FORCE_MAJEURE),
        ClauseType::DocumentName
        | ClauseType::Parties
        | ClauseType::EffectiveDate
        | ClauseType::DisputeResolution
        | ClauseType::Severability
        | ClauseType::EntireAgreement
        | ClauseType::Amendment
        | ClauseType::Waiver
        | ClauseType::Notices
        | ClauseType::Assignment
        | ClauseType::Insurance => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_clause_types_have_risk_entries() {
        let entry = lookup(ClauseType::AntiAssignment).unwrap();
        assert_eq!(entry.severity, Severity::High);
        assert!(!entry.trigger_examples.is_empty());

        let entry = lookup(ClauseType::GoverningLaw).unwrap();
        assert!(entry.risk_text.contains("jurisdiction"));
    }

    #[test]
    fn trigger_wording_is_found_case_insensitively() {
        let entry = lookup(ClauseType::Indemnification).unwrap();
        assert_eq!(
            entry.matching_trigger("Supplier shall HOLD HARMLESS the customer."),
            Some("hold harmless")
        );
        assert_eq!(entry.matching_trigger("Supplier pays its own costs."), None);
    }

    #[test]
    fn unlisted_clause_types_have_no_entry() {
        assert!(lookup(ClauseType::Insurance).is_none());
        assert!(lookup(ClauseType::Parties).is_none());
    }
}
