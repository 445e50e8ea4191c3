use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::tool::{Tool, ToolKind};

/// An ordered sequence of tools addressed by a single registry name.
///
/// The first step receives the original arguments; each later step receives
/// `{"input": <previous output>}`. The chain's result is the last output.
pub struct ToolChain {
    name: String,
    description: String,
    steps: Vec<Arc<dyn Tool>>,
}

impl ToolChain {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        steps: Vec<Arc<dyn Tool>>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            steps,
        }
    }
}

#[async_trait]
impl Tool for ToolChain {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn kind(&self) -> ToolKind {
        ToolKind::Chain
    }

    fn triggers(&self) -> Vec<String> {
        // A chain fires on any of its members' triggers.
        self.steps.iter().flat_map(|s| s.triggers()).collect()
    }

    async fn run(&self, args: serde_json::Value) -> Result<String> {
        let mut current = args;
        let mut output = String::new();
        for step in &self.steps {
            output = step.run(current).await?;
            current = serde_json::json!({ "input": output });
        }
        Ok(output)
    }
}

pub type Predicate = Box<dyn Fn(&serde_json::Value) -> bool + Send + Sync>;

/// A two-way branch: `predicate(args)` selects which tool runs.
pub struct ConditionalChain {
    name: String,
    description: String,
    predicate: Predicate,
    if_true: Arc<dyn Tool>,
    if_false: Arc<dyn Tool>,
}

impl ConditionalChain {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        predicate: Predicate,
        if_true: Arc<dyn Tool>,
        if_false: Arc<dyn Tool>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            predicate,
            if_true,
            if_false,
        }
    }
}

#[async_trait]
impl Tool for ConditionalChain {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn kind(&self) -> ToolKind {
        ToolKind::Chain
    }

    fn triggers(&self) -> Vec<String> {
        let mut t = self.if_true.triggers();
        t.extend(self.if_false.triggers());
        t
    }

    async fn run(&self, args: serde_json::Value) -> Result<String> {
        if (self.predicate)(&args) {
            self.if_true.run(args).await
        } else {
            self.if_false.run(args).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::text_arg;

    struct Upper;
    struct Exclaim;

    #[async_trait]
    impl Tool for Upper {
        fn name(&self) -> &str {
            "upper"
        }
        fn description(&self) -> &str {
            "uppercase the input"
        }
        async fn run(&self, args: serde_json::Value) -> Result<String> {
            Ok(text_arg(&args)?.to_uppercase())
        }
    }

    #[async_trait]
    impl Tool for Exclaim {
        fn name(&self) -> &str {
            "exclaim"
        }
        fn description(&self) -> &str {
            "append an exclamation mark"
        }
        async fn run(&self, args: serde_json::Value) -> Result<String> {
            Ok(format!("{}!", text_arg(&args)?))
        }
    }

    #[tokio::test]
    async fn chain_feeds_output_forward() {
        let chain = ToolChain::new(
            "shout",
            "uppercase then exclaim",
            vec![Arc::new(Upper), Arc::new(Exclaim)],
        );
        let out = chain.run(serde_json::json!({"input": "hey"})).await.unwrap();
        assert_eq!(out, "HEY!");
        assert_eq!(chain.kind(), ToolKind::Chain);
    }

    #[tokio::test]
    async fn conditional_chain_branches() {
        let cond = ConditionalChain::new(
            "maybe-shout",
            "uppercase long input, exclaim short",
            Box::new(|args| {
                args.get("input")
                    .and_then(|v| v.as_str())
                    .map(|s| s.len() > 3)
                    .unwrap_or(false)
            }),
            Arc::new(Upper),
            Arc::new(Exclaim),
        );
        assert_eq!(
            cond.run(serde_json::json!({"input": "long enough"}))
                .await
                .unwrap(),
            "LONG ENOUGH"
        );
        assert_eq!(
            cond.run(serde_json::json!({"input": "ok"})).await.unwrap(),
            "ok!"
        );
    }
}
