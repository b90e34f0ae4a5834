use std::ops::Range;

use serde::Serialize;

/// Observations emitted while rendering. Output ranges are character
/// indexes into the writer the event happened on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum InterpEvent {
    EnterTemplate { name: String, depth: usize },
    ExitTemplate { name: String, output: Range<usize> },
    /// An expression tag was written.
    EvalExpr {
        template: String,
        ip: usize,
        expr: String,
        output: Range<usize>,
    },
    Indent { template: String, indent: String },
    /// One executed instruction; only when tracing is enabled.
    Instruction {
        template: String,
        ip: usize,
        op: String,
        stack: usize,
    },
}

/// Receives interpreter events. Purely observational.
pub trait DebugListener {
    fn event(&mut self, event: InterpEvent);
}

/// Keeps every event in order.
#[derive(Debug, Default)]
pub struct EventCollector {
    pub events: Vec<InterpEvent>,
}

impl EventCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Expressions written by `template`, with the text each produced.
    pub fn expressions_of<'a>(&'a self, template: &'a str) -> impl Iterator<Item = (&'a str, &'a Range<usize>)> + 'a {
        self.events.iter().filter_map(move |e| match e {
            InterpEvent::EvalExpr {
                template: t,
                expr,
                output,
                ..
            } if t == template => Some((expr.as_str(), output)),
            _ => None,
        })
    }
}

impl DebugListener for EventCollector {
    fn event(&mut self, event: InterpEvent) {
        self.events.push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_event_tag() {
        let event = InterpEvent::EnterTemplate {
            name: "/t".into(),
            depth: 0,
        };
        let json = serde_json::to_value(&event).unwrap_or_default();
        assert_eq!(json["event"], "enter_template");
        assert_eq!(json["name"], "/t");
    }

    #[test]
    fn collector_filters_expressions() {
        let mut c = EventCollector::new();
        c.event(InterpEvent::EvalExpr {
            template: "/t".into(),
            ip: 1,
            expr: "<x>".into(),
            output: 0..3,
        });
        c.event(InterpEvent::EvalExpr {
            template: "/u".into(),
            ip: 0,
            expr: "<y>".into(),
            output: 3..4,
        });
        let found: Vec<_> = c.expressions_of("/t").collect();
        assert_eq!(found, vec![("<x>", &(0..3))]);
    }
}
