//! Terminal rendering of the conversation.

use engbuddy_core::{
    Message, PlaybackState, Role, quick_actions::QUICK_ACTIONS,
};

const THINKING: &str = "생각하는 중...";

pub fn print_header() {
    println!("EngBuddy · 중학 영어 수행평가 멘토");
    println!("Gemini AI가 답변을 생성합니다. 실수가 있을 수 있으니 확인이 필요합니다.");
    println!("명령어: /quick [번호], /play <번호>, /help, /quit");
    println!();
}

pub fn print_help() {
    println!("  <문장>           튜터에게 보내기");
    println!("  /quick           빠른 질문 목록");
    println!("  /quick <번호>    빠른 질문 사용");
    println!("  /play <번호>     해당 답변 발음 듣기");
    println!("  /quit            종료");
}

pub fn print_quick_actions() {
    for (i, action) in QUICK_ACTIONS.iter().enumerate() {
        println!("  [{}] {}", i + 1, action.label);
    }
}

pub fn print_message(message: &Message, playback: PlaybackState) {
    let speaker = match message.role() {
        Role::User => "나",
        Role::Model => "EngBuddy",
    };
    let body = if message.is_pending() {
        THINKING
    } else {
        message.text()
    };
    let marker = match (message.role(), message.is_pending(), playback) {
        (Role::Model, false, PlaybackState::Loading) => " (로딩 중...)",
        (Role::Model, false, PlaybackState::Playing) => " (재생 중)",
        (Role::Model, false, PlaybackState::Idle) => " (발음 듣기: /play)",
        _ => "",
    };
    println!(
        "#{} {} [{}]{}",
        message.id(),
        speaker,
        message.created_at().format("%H:%M"),
        marker
    );
    for line in body.lines() {
        println!("    {}", line);
    }
    println!();
}

/// A notice the user has to see, like a browser alert.
pub fn print_notice(text: &str) {
    println!("⚠️  {}", text);
}
