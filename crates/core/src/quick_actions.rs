//! Canned prompts offered next to the input box.

/// Marks a prompt the student has to complete before sending.
pub const INPUT_PLACEHOLDER_MARKER: &str = "(여기에 문장을 입력하세요)";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuickAction {
    pub label: &'static str,
    pub prompt: &'static str,
}

/// What the front-end should do with a selected quick action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuickDispatch {
    /// Put the prompt into the input box for the student to finish.
    Prefill(&'static str),
    /// Submit the prompt as-is.
    Submit(&'static str),
}

impl QuickAction {
    pub fn dispatch(&self) -> QuickDispatch {
        if self.prompt.contains(INPUT_PLACEHOLDER_MARKER) {
            QuickDispatch::Prefill(self.prompt)
        } else {
            QuickDispatch::Submit(self.prompt)
        }
    }
}

pub const QUICK_ACTIONS: [QuickAction; 4] = [
    QuickAction {
        label: "주제 추천해줘",
        prompt: "중학교 2학년 수준의 영어 말하기 수행평가 주제 3가지만 추천해줘. 각 주제별로 간단한 이유도 한국어로 설명해줘.",
    },
    QuickAction {
        label: "문법 교정해줘",
        prompt: "내가 쓴 영어 문장을 문법적으로 완벽하게 고쳐주고, 틀린 부분을 설명해줘. (여기에 문장을 입력하세요)",
    },
    QuickAction {
        label: "표현 다듬기",
        prompt: "내가 쓴 글을 좀 더 원어민스럽고 자연스러운 표현으로 바꿔줘. (여기에 문장을 입력하세요)",
    },
    QuickAction {
        label: "도움말",
        prompt: "EngBuddy, 너는 어떤 기능을 도와줄 수 있어? 사용 방법을 알려줘.",
    },
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch() {
        let dispatched: Vec<QuickDispatch> = QUICK_ACTIONS.iter().map(QuickAction::dispatch).collect();
        assert!(matches!(dispatched[0], QuickDispatch::Submit(_)));
        assert!(matches!(dispatched[1], QuickDispatch::Prefill(p) if p.ends_with(INPUT_PLACEHOLDER_MARKER)));
        assert!(matches!(dispatched[2], QuickDispatch::Prefill(_)));
        assert_eq!(dispatched[3], QuickDispatch::Submit(QUICK_ACTIONS[3].prompt));
    }
}
