//! Keyword heuristics behind the "AI" endpoints.
//!
//! Everything here is deterministic substring matching against fixed Korean
//! dictionaries. Matching lowercases both the text and the dictionary words,
//! so latin entries like `API` or `UX` match regardless of case.

use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap, HashSet};

const SENTIMENT_KEYWORDS: &[(&str, &[&str])] = &[
    ("긍정", &["성장", "배움", "성취", "개선", "향상", "발전", "성공", "좋았", "잘했"]),
    ("부정", &["어려움", "실패", "부족", "힘들", "문제", "걱정", "아쉬움"]),
    ("행동", &["시도", "도전", "노력", "계획", "실행", "진행"]),
    ("감정", &["기쁨", "즐거움", "뿌듯", "만족", "불안", "답답", "고민"]),
];

const TAG_KEYWORDS: &[(&str, &[&str])] = &[
    ("개발", &["코드", "프로그래밍", "개발", "버그", "디버깅", "API", "데이터베이스", "알고리즘"]),
    ("공부", &["공부", "학습", "강의", "책", "독서", "강좌", "수업", "시험"]),
    ("협업", &["회의", "미팅", "팀", "협업", "논의", "발표", "공유", "커뮤니케이션"]),
    ("기획", &["기획", "아이디어", "계획", "전략", "설계", "구상"]),
    ("디자인", &["디자인", "UI", "UX", "화면", "레이아웃", "스타일"]),
    ("문제해결", &["해결", "수정", "개선", "최적화", "리팩토링"]),
    ("성취", &["완료", "달성", "성공", "배포", "출시", "구현"]),
    ("고민", &["고민", "선택", "결정", "방향", "판단"]),
];

const ACTIVITY_BASE_TAGS: &[(&str, &[&str])] = &[
    ("contest", &["기획", "발표", "팀워크", "아이디어"]),
    ("club", &["협업", "리더십", "네트워킹", "팀빌딩"]),
    ("project", &["개발", "문제해결", "디자인", "기획"]),
    ("internship", &["업무", "실무경험", "커뮤니케이션", "전문성"]),
    ("study", &["학습", "성장", "집중", "자기계발"]),
    ("etc", &["경험", "활동", "참여", "도전"]),
];

/// Memo triggers for tag suggestion, checked in order.
const MEMO_TRIGGERS: &[(&[&str], &str)] = &[
    (&["발표", "프레젠테이션"], "발표"),
    (&["회의"], "회의"),
    (&["기획"], "기획"),
    (&["디자인"], "디자인"),
    (&["코딩", "개발"], "개발"),
    (&["분석", "데이터"], "데이터분석"),
];

const COMPETENCY_KEYWORDS: &[(&str, &[&str])] = &[
    ("리더십", &["리더", "이끌", "주도", "리드"]),
    ("팀워크", &["팀", "협업", "함께", "협력"]),
    ("문제해결", &["해결", "개선", "원인", "대안"]),
    ("커뮤니케이션", &["소통", "발표", "설득", "커뮤니케이션", "공유"]),
    ("데이터분석", &["데이터", "분석", "통계", "지표"]),
    ("기획력", &["기획", "전략", "계획", "설계"]),
    ("창의성", &["아이디어", "창의", "새로운", "독창"]),
    ("성실성", &["꾸준", "매일", "끝까지", "책임"]),
];

pub const DEFAULT_TAG: &str = "일반";
const MAX_TAGS: usize = 5;
const SHORT_CONTENT_CHARS: usize = 50;

pub const ACTIVITY_TYPES: &[&str] = &["contest", "club", "project", "internship", "study", "etc"];
pub const MOOD_COMPARES: &[&str] = &["worse", "same", "better"];

fn contains_word(haystack_lower: &str, word: &str) -> bool {
    haystack_lower.contains(&word.to_lowercase())
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ReflectionFeedback {
    pub feedback: String,
    pub suggestions: Vec<String>,
    pub sentiment_score: i32,
    pub action_score: i32,
    pub keywords_found: BTreeMap<String, i32>,
}

impl ReflectionFeedback {
    /// Categories that matched at least once, used as stored reflection keywords.
    pub fn matched_categories(&self) -> Vec<String> {
        self.keywords_found
            .iter()
            .filter(|(_, n)| **n > 0)
            .map(|(k, _)| k.clone())
            .collect()
    }
}

pub fn reflection_feedback(content: &str) -> ReflectionFeedback {
    let lower = content.to_lowercase();
    let mut counts: BTreeMap<String, i32> = BTreeMap::new();
    for (category, words) in SENTIMENT_KEYWORDS {
        let hits = words.iter().filter(|w| contains_word(&lower, w)).count() as i32;
        counts.insert((*category).to_string(), hits);
    }
    let count = |k: &str| counts.get(k).copied().unwrap_or(0);
    let (positive, negative, action) = (count("긍정"), count("부정"), count("행동"));

    let mut parts = Vec::new();
    if positive > negative {
        parts.push("긍정적인 성장 마인드가 돋보입니다.");
    }
    if action > 2 {
        parts.push("적극적으로 행동하고 실천하는 모습이 인상적입니다.");
    }
    if negative > 0 {
        parts.push("어려움을 인지하고 있다는 것 자체가 성장의 시작입니다.");
    }
    if parts.is_empty() {
        parts.push("자신을 돌아보는 시간을 가지셨네요. 계속해서 회고를 작성하며 성장해나가세요.");
    }

    let mut suggestions = Vec::new();
    if negative > positive {
        suggestions.push("긍정적인 측면도 함께 기록해보세요".to_string());
    }
    if action == 0 {
        suggestions.push("다음에는 구체적인 행동 계획을 포함해보세요".to_string());
    }
    if content.chars().count() < SHORT_CONTENT_CHARS {
        suggestions.push("조금 더 자세히 작성하면 더 깊은 인사이트를 얻을 수 있습니다".to_string());
    }

    ReflectionFeedback {
        feedback: parts.join(" "),
        suggestions,
        sentiment_score: (5 + positive - negative).clamp(1, 10),
        action_score: action.min(10),
        keywords_found: counts,
    }
}

/// Category tags for a micro log. At most five, `["일반"]` when nothing matches.
pub fn micro_log_tags(content: &str, context: Option<&str>) -> Vec<String> {
    let mut text = content.to_lowercase();
    if let Some(ctx) = context {
        text.push(' ');
        text.push_str(&ctx.to_lowercase());
    }
    let tags: Vec<String> = TAG_KEYWORDS
        .iter()
        .filter(|(_, words)| words.iter().any(|w| contains_word(&text, w)))
        .map(|(tag, _)| (*tag).to_string())
        .take(MAX_TAGS)
        .collect();
    if tags.is_empty() {
        vec![DEFAULT_TAG.to_string()]
    } else {
        tags
    }
}

/// Three base tags for the activity type, then memo-triggered tags, deduplicated in order.
pub fn suggest_tags(activity_type: &str, memo: &str) -> Vec<String> {
    let base: &[&str] = ACTIVITY_BASE_TAGS
        .iter()
        .find(|(t, _)| *t == activity_type)
        .map(|(_, tags)| *tags)
        .unwrap_or(&["활동"]);

    let mut suggested: Vec<&str> = base.iter().take(3).copied().collect();
    for (triggers, tag) in MEMO_TRIGGERS {
        if triggers.iter().any(|t| memo.contains(t)) {
            suggested.push(*tag);
        }
    }

    let mut seen = HashSet::new();
    suggested
        .into_iter()
        .filter(|t| seen.insert(*t))
        .take(MAX_TAGS)
        .map(str::to_string)
        .collect()
}

/// Reads a column that may hold a list or a single string.
pub fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        Some(Value::String(s)) if !s.is_empty() => vec![s.clone()],
        _ => Vec::new(),
    }
}

fn skill_level(skill_count: usize) -> &'static str {
    if skill_count > 5 {
        "고급"
    } else if skill_count > 2 {
        "중급"
    } else {
        "초급"
    }
}

fn match_reason(score: i64) -> &'static str {
    if score >= 5 {
        "당신의 관심사와 스킬에 매우 적합합니다"
    } else if score >= 3 {
        "당신의 관심 분야와 관련이 있습니다"
    } else if score >= 1 {
        "새로운 경험을 쌓을 수 있는 기회입니다"
    } else {
        "도전해볼 만한 활동입니다"
    }
}

/// Integer profile score for one activity.
pub fn profile_score(interests: &[String], skills: &[String], activity: &Value) -> i64 {
    let fields: Vec<String> = string_list(activity.get("field"))
        .into_iter()
        .map(|f| f.to_lowercase())
        .collect();
    let required: Vec<String> = string_list(activity.get("required_skills"))
        .into_iter()
        .map(|r| r.to_lowercase())
        .collect();

    let mut score = 0;
    for interest in interests {
        let interest = interest.to_lowercase();
        if fields.iter().any(|f| f.contains(&interest)) {
            score += 3;
        }
    }
    for skill in skills {
        let skill = skill.to_lowercase();
        if required.iter().any(|r| r.contains(&skill)) {
            score += 2;
        }
    }

    let category = activity.get("category").and_then(Value::as_str).unwrap_or("");
    let joined_interests = interests.join(" ");
    for bonus in ["공모전", "대외활동"] {
        if category.contains(bonus) && joined_interests.contains(bonus) {
            score += 2;
        }
    }

    if let Some(level) = activity.get("level").and_then(Value::as_str) {
        if !level.is_empty() && level == skill_level(skills.len()) {
            score += 1;
        }
    }
    score
}

/// Annotates activities with `match_score`/`match_reason`, best first.
pub fn recommend_for_profile(interests: &[String], skills: &[String], activities: Vec<Value>) -> Vec<Value> {
    let mut scored: Vec<(i64, Value)> = activities
        .into_iter()
        .map(|mut activity| {
            let score = profile_score(interests, skills, &activity);
            if let Value::Object(map) = &mut activity {
                map.insert("match_score".into(), json!(score));
                map.insert("match_reason".into(), json!(match_reason(score)));
            }
            (score, activity)
        })
        .collect();
    scored.sort_by(|a, b| b.0.cmp(&a.0));
    scored.into_iter().map(|(_, a)| a).collect()
}

/// What a user brings to weighted activity matching.
#[derive(Debug, Clone, Default)]
pub struct MatchProfile {
    pub major: Option<String>,
    pub skill_keywords: Vec<String>,
    pub interested_fields: Vec<String>,
    pub preferred_difficulty: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MatchResult {
    pub score: f64,
    pub reasons: BTreeMap<String, f64>,
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Distinct shared items over the length of the user's list, duplicates included.
fn overlap_share(user: &[String], activity: &[String], weight: f64) -> f64 {
    let user_set: HashSet<&String> = user.iter().collect();
    let activity_set: HashSet<&String> = activity.iter().collect();
    let shared = user_set.intersection(&activity_set).count();
    if shared == 0 {
        return 0.0;
    }
    let share = shared as f64 / user.len().max(1) as f64 * weight;
    share.min(weight)
}

/// Weighted score in `[0, 1]`: major 0.3, keywords 0.4, fields 0.2, difficulty 0.1.
pub fn match_score(profile: &MatchProfile, activity: &Value) -> MatchResult {
    let mut score = 0.0;
    let mut reasons = BTreeMap::new();

    let majors = string_list(activity.get("recommended_majors"));
    if let Some(major) = profile.major.as_deref().filter(|m| !m.is_empty()) {
        if !majors.is_empty() && majors.iter().any(|m| m == major || m == "전공무관") {
            score += 0.3;
            reasons.insert("major_match".to_string(), 0.3);
        }
    }

    let keywords = string_list(activity.get("keywords"));
    let keyword_score = overlap_share(&profile.skill_keywords, &keywords, 0.4);
    if keyword_score > 0.0 {
        score += keyword_score;
        reasons.insert("keyword_match".to_string(), round2(keyword_score));
    }

    let fields = string_list(activity.get("fields"));
    let field_score = overlap_share(&profile.interested_fields, &fields, 0.2);
    if field_score > 0.0 {
        score += field_score;
        reasons.insert("interest_match".to_string(), round2(field_score));
    }

    let difficulty = activity.get("difficulty_level").and_then(Value::as_str);
    if let (Some(wanted), Some(actual)) = (profile.preferred_difficulty.as_deref(), difficulty) {
        if !wanted.is_empty() && wanted == actual {
            score += 0.1;
            reasons.insert("difficulty_match".to_string(), 0.1);
        }
    }

    MatchResult {
        score: round2(score),
        reasons,
    }
}

fn period_label(period: &str) -> &str {
    match period {
        "week" => "이번 주",
        "month" => "이번 달",
        "quarter" => "이번 분기",
        "year" => "올해",
        other => other,
    }
}

/// Summary of a batch of reflection texts over a period.
pub fn growth_story(contents: &[String], period: &str) -> Value {
    if contents.is_empty() {
        return json!({
            "period": period,
            "summary": "아직 회고 데이터가 충분하지 않습니다.",
            "highlights": [],
            "growth_areas": [],
            "recommendations": ["꾸준히 회고를 작성해보세요"],
            "total_reflections": 0,
        });
    }

    let total = contents.len();
    let all = contents.join(" ");
    let growth = ["성장", "배움", "개선", "발전"].iter().filter(|k| all.contains(*k)).count();
    let challenge = ["어려움", "도전", "문제"].iter().filter(|k| all.contains(*k)).count();

    let mut summary = format!("{} 동안 {}개의 회고를 작성하셨습니다. ", period_label(period), total);
    if growth > challenge {
        summary.push_str("긍정적인 성장을 이루고 계십니다.");
    } else {
        summary.push_str("도전적인 경험들을 쌓아가고 계십니다.");
    }

    let growth_areas: &[&str] = if total >= 5 {
        &["자기성찰", "꾸준함"]
    } else {
        &["시작하는 용기"]
    };

    json!({
        "period": period,
        "summary": summary,
        "highlights": [
            format!("총 {}개의 회고 작성", total),
            format!("성장 관련 키워드 {}회 언급", growth),
            format!("도전 관련 키워드 {}회 언급", challenge),
        ],
        "growth_areas": growth_areas,
        "recommendations": [
            "다양한 회고 템플릿을 활용해보세요",
            "회고를 바탕으로 구체적인 액션 플랜을 세워보세요",
        ],
        "total_reflections": total,
    })
}

/// Template id suited to recent moods and the space type.
pub fn recommend_template(recent_moods: &[String], space_type: Option<&str>) -> &'static str {
    let negative = recent_moods
        .iter()
        .filter(|m| matches!(m.as_str(), "bad" | "terrible"))
        .count();
    if !recent_moods.is_empty() && negative * 2 >= recent_moods.len() {
        return "mad-sad-glad";
    }
    match space_type {
        Some("공모전") | Some("프로젝트") => "kpt",
        Some("스터디") => "4f",
        _ => "weekly-review",
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Competency {
    pub text: String,
    pub hits: usize,
    pub confidence: f64,
}

/// Competencies mentioned in free text, strongest first.
pub fn extract_competencies(content: &str) -> Vec<Competency> {
    let lower = content.to_lowercase();
    let mut found: Vec<Competency> = COMPETENCY_KEYWORDS
        .iter()
        .filter_map(|(name, words)| {
            let hits = words.iter().filter(|w| contains_word(&lower, w)).count();
            (hits > 0).then(|| Competency {
                text: (*name).to_string(),
                hits,
                confidence: round2((0.6 + 0.1 * hits as f64).min(0.95)),
            })
        })
        .collect();
    found.sort_by(|a, b| b.hits.cmp(&a.hits));
    found
}

/// Keyword summary of a project's logs, stored as `ai_summary`.
pub fn project_summary(contents: &[String]) -> (String, Vec<String>) {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for content in contents {
        for tag in micro_log_tags(content, None) {
            if tag != DEFAULT_TAG {
                *counts.entry(tag).or_default() += 1;
            }
        }
    }
    let top = most_common(counts, 3);
    if top.is_empty() {
        return (
            format!("{}개의 기록이 있지만 뚜렷한 주제가 아직 보이지 않습니다.", contents.len()),
            Vec::new(),
        );
    }
    let names: Vec<String> = top.into_iter().map(|(t, _)| t).collect();
    let summary = format!(
        "이 프로젝트는 {}을(를) 중심으로 진행되었습니다. 총 {}개의 기록을 바탕으로 분석했습니다.",
        names.join(", "),
        contents.len()
    );
    (summary, names)
}

/// Entries ordered by count descending, ties broken by key for stable output.
pub fn most_common(counts: HashMap<String, usize>, n: usize) -> Vec<(String, usize)> {
    let mut entries: Vec<(String, usize)> = counts.into_iter().collect();
    entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    entries.truncate(n);
    entries
}

pub fn activity_label(activity_type: &str) -> &'static str {
    match activity_type {
        "contest" => "공모전/대외활동",
        "club" => "학회/동아리",
        "project" => "프로젝트",
        "internship" => "인턴/아르바이트",
        "study" => "자격증/공부",
        _ => "기타",
    }
}

pub fn activity_icon(activity_type: &str) -> &'static str {
    match activity_type {
        "contest" => "🏆",
        "club" => "👥",
        "project" | "internship" => "💼",
        "study" => "📚",
        _ => "✨",
    }
}

pub fn positive_reason_text(code: &str) -> &'static str {
    match code {
        "positive_001" => "사람들과 의견 주고받는 활동에서 에너지를 얻어요",
        "positive_002" => "새로운 것을 배우는 과정을 즐겨요",
        "positive_003" => "자신의 강점을 발휘할 수 있는 활동에서 빛나요",
        "positive_004" => "누군가에게 도움이 되는 일에서 보람을 느껴요",
        "positive_005" => "일이 술술 풀릴 때 기분이 좋아져요",
        "positive_006" => "성과를 인정받을 때 뿌듯함을 느껴요",
        _ => "긍정적인 경험을 많이 하고 있어요",
    }
}

pub fn negative_reason_text(code: &str) -> &'static str {
    match code {
        "negative_001" => "생각보다 잘 안 풀리는 상황에서 스트레스를 받아요",
        "negative_002" => "사람들과 의견이 안 맞을 때 어려움을 느껴요",
        "negative_003" => "시간이 오래 걸리는 작업에서 지쳐요",
        "negative_004" => "자신이 못하는 부분이 드러날 때 힘들어해요",
        "negative_005" => "하기 싫은 일을 억지로 할 때 에너지가 떨어져요",
        "negative_006" => "결과가 기대에 못 미칠 때 실망해요",
        _ => "어려운 경험도 있었어요",
    }
}
