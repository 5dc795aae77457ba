//! Listing sources. Each site currently yields a fixed sample of listings
//! with deadlines relative to the crawl date.

use async_trait::async_trait;
use chrono::{Duration, NaiveDate};
use tracing::{info, instrument};

use crate::crawlers::{ActivitySource, RawListing};
use crate::error::Result;

pub const LINKAREER: &str = "linkareer";
pub const WEVITY: &str = "wevity";
pub const THINKPOOL: &str = "thinkpool";
pub const ONOFFMIX: &str = "onoffmix";

pub const ALL_SOURCES: &[&str] = &[LINKAREER, WEVITY, THINKPOOL, ONOFFMIX];

/// Sample entry: title, organization, category, type, description,
/// days until the deadline, fields, prize money, url.
type Sample = (
    &'static str,
    &'static str,
    &'static str,
    &'static str,
    &'static str,
    i64,
    &'static [&'static str],
    i64,
    &'static str,
);

/// A site served from a fixed sample.
pub struct SampleSource {
    name: &'static str,
    difficulty: &'static str,
    samples: &'static [Sample],
}

impl SampleSource {
    fn listings(&self, today: NaiveDate) -> Vec<RawListing> {
        self.samples
            .iter()
            .map(
                |(title, organization, category, kind, description, days, fields, prize, url)| RawListing {
                    title: title.to_string(),
                    organization: organization.to_string(),
                    category: category.to_string(),
                    kind: kind.to_string(),
                    description: description.to_string(),
                    application_end_date: Some(today + Duration::days(*days)),
                    fields: fields.iter().map(|f| f.to_string()).collect(),
                    prize_money: *prize,
                    url: url.to_string(),
                    difficulty_level: self.difficulty.to_string(),
                },
            )
            .collect()
    }
}

#[async_trait]
impl ActivitySource for SampleSource {
    fn source_name(&self) -> &'static str {
        self.name
    }

    #[instrument(skip(self), fields(source = self.name))]
    async fn fetch_activities(&self, today: NaiveDate) -> Result<Vec<RawListing>> {
        let listings = self.listings(today);
        info!("Collected {} listings", listings.len());
        Ok(listings)
    }
}

const LINKAREER_SAMPLES: &[Sample] = &[
    (
        "2025 네이버 AI 해커톤",
        "네이버",
        "contest",
        "해커톤",
        "AI 기술을 활용한 혁신적인 서비스 개발 해커톤",
        30,
        &["IT", "AI"],
        10_000_000,
        "https://linkareer.com/activity/123456",
    ),
    (
        "카카오 서포터즈 8기 모집",
        "카카오",
        "club",
        "서포터즈",
        "카카오 서비스 홍보 및 마케팅 활동",
        20,
        &["기획", "마케팅"],
        0,
        "https://linkareer.com/activity/234567",
    ),
];

const WEVITY_SAMPLES: &[Sample] = &[
    (
        "2025 대학생 광고 공모전",
        "한국광고총연합회",
        "contest",
        "공모전",
        "창의적인 광고 아이디어 공모",
        45,
        &["기획", "디자인"],
        5_000_000,
        "https://www.wevity.com/contest/345678",
    ),
    (
        "UX/UI 디자인 공모전",
        "삼성전자",
        "contest",
        "공모전",
        "혁신적인 사용자 경험 디자인",
        35,
        &["디자인"],
        3_000_000,
        "https://www.wevity.com/contest/456789",
    ),
];

const THINKPOOL_SAMPLES: &[Sample] = &[
    (
        "대학생 창업 동아리 모집",
        "중소벤처기업부",
        "club",
        "동아리",
        "예비 창업자를 위한 창업 동아리",
        15,
        &["경영", "기획"],
        0,
        "https://www.thinkpool.com/567890",
    ),
    (
        "빅데이터 분석 프로젝트",
        "한국데이터산업진흥원",
        "project",
        "프로젝트",
        "공공 데이터 활용 프로젝트",
        40,
        &["IT", "데이터"],
        7_000_000,
        "https://www.thinkpool.com/678901",
    ),
];

const ONOFFMIX_SAMPLES: &[Sample] = &[(
    "AI 스타트업 해커톤 2025",
    "구글 스타트업",
    "contest",
    "해커톤",
    "AI 기반 스타트업 아이디어 경진대회",
    25,
    &["IT", "경영"],
    15_000_000,
    "https://onoffmix.com/789012",
)];

/// Source by name, `None` for an unknown site.
pub fn create_source(name: &str) -> Option<Box<dyn ActivitySource>> {
    let (difficulty, samples) = match name {
        LINKAREER => ("intermediate", LINKAREER_SAMPLES),
        WEVITY => ("beginner", WEVITY_SAMPLES),
        THINKPOOL => ("intermediate", THINKPOOL_SAMPLES),
        ONOFFMIX => ("advanced", ONOFFMIX_SAMPLES),
        _ => return None,
    };
    let name = ALL_SOURCES.iter().copied().find(|n| *n == name)?;
    Some(Box::new(SampleSource {
        name,
        difficulty,
        samples,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn every_source_has_listings() {
        let today = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        for name in ALL_SOURCES {
            let source = create_source(name).unwrap();
            assert_eq!(source.source_name(), *name);
            let listings = source.fetch_activities(today).await.unwrap();
            assert!(!listings.is_empty());
            assert!(listings.iter().all(|l| l.application_end_date.unwrap() > today));
        }
    }

    #[test]
    fn unknown_source_is_none() {
        assert!(create_source("saramin").is_none());
    }
}
