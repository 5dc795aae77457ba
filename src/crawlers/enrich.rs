//! Field, keyword and major tagging for crawled activity listings.

use chrono::{Datelike, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;

pub const OTHER_FIELD: &str = "기타";
pub const ANY_MAJOR: &str = "전공무관";

const MAX_KEYWORDS: usize = 10;
const MAX_MAJORS: usize = 5;

const FIELD_WORDS: &[(&str, &[&str])] = &[
    (
        "IT",
        &[
            "개발", "프로그래밍", "코딩", "소프트웨어", "SW", "앱", "웹", "서버", "인공지능", "AI", "머신러닝",
            "데이터", "빅데이터",
        ],
    ),
    ("기획", &["기획", "전략", "마케팅", "브랜드", "사업", "비즈니스"]),
    ("디자인", &["디자인", "UX", "UI", "그래픽", "시각", "영상", "편집"]),
    ("경영", &["경영", "경제", "금융", "회계", "재무"]),
    ("교육", &["교육", "멘토링", "강의", "튜터"]),
    ("예술", &["예술", "미술", "음악", "공연", "문화"]),
    ("의료", &["의료", "간호", "보건", "제약"]),
    ("환경", &["환경", "에너지", "지속가능", "친환경"]),
    ("사회", &["봉사", "복지", "사회", "공익"]),
];

const FIELD_KEYWORDS: &[(&str, &[&str])] = &[
    (
        "IT",
        &["Python", "Java", "JavaScript", "React", "AI", "머신러닝", "딥러닝", "앱개발", "웹개발"],
    ),
    ("기획", &["기획서", "전략", "마케팅", "SNS", "브랜딩"]),
    ("디자인", &["포토샵", "일러스트", "Figma", "UX", "UI"]),
    ("경영", &["창업", "사업계획서", "투자", "경영전략"]),
];

const COMMON_KEYWORDS: &[&str] = &["대학생", "청년", "팀프로젝트", "개인참가", "온라인", "오프라인"];

const FIELD_MAJORS: &[(&str, &[&str])] = &[
    ("IT", &["컴퓨터공학", "소프트웨어공학", "정보통신공학", "인공지능학과"]),
    ("기획", &["경영학", "경제학", "광고홍보학", "미디어커뮤니케이션"]),
    ("디자인", &["시각디자인", "산업디자인", "인터랙션디자인", "영상디자인"]),
    ("경영", &["경영학", "경제학", "회계학", "국제통상학"]),
    ("교육", &["교육학", "사범대학"]),
    ("의료", &["의학", "간호학", "약학", "보건학"]),
    ("환경", &["환경공학", "에너지공학"]),
    ("사회", &["사회복지학", "행정학", "정치외교학"]),
];

static ISO_DATE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"^(\d{4})-(\d{2})-(\d{2})").ok());
static DOT_DATE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"^(\d{4})\.(\d{2})\.(\d{2})").ok());
static SLASH_DATE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"^(\d{2})/(\d{2})").ok());

fn push_unique(list: &mut Vec<String>, item: &str) {
    if !list.iter().any(|x| x == item) {
        list.push(item.to_string());
    }
}

/// Fields whose trigger words appear in `text`; `["기타"]` when none do.
pub fn extract_fields(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    let fields: Vec<String> = FIELD_WORDS
        .iter()
        .filter(|(_, words)| words.iter().any(|w| text.contains(w) || lower.contains(&w.to_lowercase())))
        .map(|(field, _)| field.to_string())
        .collect();
    if fields.is_empty() {
        vec![OTHER_FIELD.to_string()]
    } else {
        fields
    }
}

/// Field-specific and common keywords found in `text`, at most ten.
pub fn extract_keywords(text: &str, fields: &[String]) -> Vec<String> {
    let lower = text.to_lowercase();
    let mut keywords = Vec::new();
    for field in fields {
        if let Some((_, words)) = FIELD_KEYWORDS.iter().find(|(f, _)| f == field) {
            for word in words.iter().filter(|w| lower.contains(&w.to_lowercase())) {
                push_unique(&mut keywords, word);
            }
        }
    }
    for word in COMMON_KEYWORDS.iter().filter(|w| text.contains(*w)) {
        push_unique(&mut keywords, word);
    }
    keywords.truncate(MAX_KEYWORDS);
    keywords
}

/// Majors suited to `fields`, always led by 전공무관, at most five.
pub fn recommended_majors(fields: &[String]) -> Vec<String> {
    let mut majors = vec![ANY_MAJOR.to_string()];
    for field in fields {
        if let Some((_, list)) = FIELD_MAJORS.iter().find(|(f, _)| f == field) {
            for major in list.iter() {
                push_unique(&mut majors, major);
            }
        }
    }
    majors.truncate(MAX_MAJORS);
    majors
}

fn captures<'t>(re: &Option<Regex>, text: &'t str) -> Option<regex::Captures<'t>> {
    re.as_ref()?.captures(text)
}

fn ymd(year: &str, month: &str, day: &str) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year.parse().ok()?, month.parse().ok()?, day.parse().ok()?)
}

/// Reads `YYYY-MM-DD`, `YYYY.MM.DD` or `MM/DD` (placed in `year`).
pub fn parse_date(text: &str, year: i32) -> Option<NaiveDate> {
    let text = text.trim();
    if let Some(c) = captures(&ISO_DATE, text).or_else(|| captures(&DOT_DATE, text)) {
        return ymd(&c[1], &c[2], &c[3]);
    }
    if let Some(c) = captures(&SLASH_DATE, text) {
        return NaiveDate::from_ymd_opt(year, c[1].parse().ok()?, c[2].parse().ok()?);
    }
    None
}

/// [`parse_date`] with the year taken from `today`.
pub fn parse_listing_date(text: &str, today: NaiveDate) -> Option<NaiveDate> {
    parse_date(text, today.year())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn fields_from_text() {
        assert_eq!(extract_fields("AI 기반 웹 서비스 기획"), strings(&["IT", "기획"]));
        assert_eq!(extract_fields("ux 리서치"), strings(&["디자인"]));
        assert_eq!(extract_fields("등산 모임"), strings(&["기타"]));
    }

    #[test]
    fn keywords_follow_fields() {
        let kw = extract_keywords("React 웹개발 대학생 온라인 해커톤", &strings(&["IT"]));
        assert_eq!(kw, strings(&["React", "웹개발", "대학생", "온라인"]));
        let kw = extract_keywords("React 웹개발", &strings(&["디자인"]));
        assert!(kw.is_empty());
    }

    #[test]
    fn majors_lead_with_any_major() {
        let majors = recommended_majors(&strings(&["IT", "기획"]));
        assert_eq!(majors.len(), 5);
        assert_eq!(majors[0], ANY_MAJOR);
        assert_eq!(majors[1], "컴퓨터공학");
        assert_eq!(recommended_majors(&[]), strings(&[ANY_MAJOR]));
    }

    #[test]
    fn dates_in_three_shapes() {
        let d = |y, m, day| NaiveDate::from_ymd_opt(y, m, day);
        assert_eq!(parse_date("2025-03-01", 2024), d(2025, 3, 1));
        assert_eq!(parse_date("2025.03.01", 2024), d(2025, 3, 1));
        assert_eq!(parse_date("03/01", 2024), d(2024, 3, 1));
        assert_eq!(parse_date("02/30", 2024), None);
        assert_eq!(parse_date("곧 마감", 2024), None);
    }
}
