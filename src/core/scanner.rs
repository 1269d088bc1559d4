use crate::config::task_config::PatternConfig;
use crate::domain::ports::ContentRule;
use crate::utils::error::{CodegenError, Result};
use regex::Regex;

/// 以正規表達式比對的掃描規則
#[derive(Debug, Clone)]
pub struct PatternRule {
    pattern: Regex,
    description: String,
}

impl PatternRule {
    pub fn new(pattern: &str, description: impl Into<String>) -> Result<Self> {
        let pattern = Regex::new(pattern).map_err(|e| CodegenError::InvalidConfigValueError {
            field: "security.forbidden_patterns".to_string(),
            value: pattern.to_string(),
            reason: format!("Invalid regular expression: {}", e),
        })?;
        Ok(Self {
            pattern,
            description: description.into(),
        })
    }
}

impl ContentRule for PatternRule {
    fn name(&self) -> &str {
        &self.description
    }

    fn check(&self, content: &str) -> Option<String> {
        self.pattern.find(content).map(|m| {
            format!(
                "Found potentially dangerous pattern: {} (`{}` at byte {})",
                self.description,
                self.pattern.as_str(),
                m.start()
            )
        })
    }
}

#[derive(Default)]
pub struct ContentScanner {
    rules: Vec<Box<dyn ContentRule>>,
}

impl ContentScanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_patterns(patterns: &[PatternConfig]) -> Result<Self> {
        let mut scanner = Self::new();
        for p in patterns {
            scanner = scanner.with_rule(PatternRule::new(&p.pattern, p.description.clone())?);
        }
        Ok(scanner)
    }

    pub fn with_rule<R: ContentRule + 'static>(mut self, rule: R) -> Self {
        self.rules.push(Box::new(rule));
        self
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// 回傳所有命中規則的描述，依規則順序排列
    pub fn scan(&self, content: &str) -> Vec<String> {
        self.rules
            .iter()
            .filter_map(|rule| {
                let finding = rule.check(content);
                if finding.is_some() {
                    tracing::debug!("Content rule matched: {}", rule.name());
                }
                finding
            })
            .collect()
    }
}

impl std::fmt::Debug for ContentScanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.rules.iter().map(|r| r.name()).collect();
        f.debug_struct("ContentScanner").field("rules", &names).finish()
    }
}
