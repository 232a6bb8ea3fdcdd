//! Leaky bucket shapes for every rate-limited action.
//!
//! Each key is a table `{ period = <seconds>, burst = <n>, refill = <n> }`.

use serde::Deserialize;

use crate::security::leaky_bucket::LeakyBucketType;
use crate::security::rate_limit::RateAction;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RatesConfig {
    #[serde(default = "default_search")]
    pub search: LeakyBucketType,
    #[serde(default = "default_chat")]
    pub chat: LeakyBucketType,
    /// MyINFO updates forwarded to everyone.
    #[serde(default = "default_myinfo")]
    pub myinfo: LeakyBucketType,
    /// MyINFO updates accepted at all (forwarded to operators).
    #[serde(default = "default_myinfo_op")]
    pub myinfo_op: LeakyBucketType,
    #[serde(default = "default_get_nicklist")]
    pub get_nicklist: LeakyBucketType,
    #[serde(default = "default_get_info")]
    pub get_info: LeakyBucketType,
    /// `$ConnectToMe` and `$RevConnectToMe`.
    #[serde(default = "default_downloads")]
    pub downloads: LeakyBucketType,
    #[serde(default = "default_search_results_in")]
    pub search_results_in: LeakyBucketType,
    #[serde(default = "default_search_results_out")]
    pub search_results_out: LeakyBucketType,
    /// Rate of warnings sent back to a user.
    #[serde(default = "default_warnings")]
    pub warnings: LeakyBucketType,
    /// Violations tolerated before an automatic ban.
    #[serde(default = "default_violations")]
    pub violations: LeakyBucketType,
    /// Hub-wide connection admission.
    #[serde(default = "default_connects")]
    pub connects: LeakyBucketType,
}

impl RatesConfig {
    pub fn bucket(&self, action: RateAction) -> &LeakyBucketType {
        match action {
            RateAction::Search => &self.search,
            RateAction::Chat => &self.chat,
            RateAction::MyInfo => &self.myinfo,
            RateAction::MyInfoOp => &self.myinfo_op,
            RateAction::GetNickList => &self.get_nicklist,
            RateAction::GetInfo => &self.get_info,
            RateAction::Downloads => &self.downloads,
            RateAction::SearchResultsIn => &self.search_results_in,
            RateAction::SearchResultsOut => &self.search_results_out,
            RateAction::Warnings => &self.warnings,
            RateAction::Violations => &self.violations,
        }
    }

    pub fn bucket_mut(&mut self, name: &str) -> Option<&mut LeakyBucketType> {
        Some(match name {
            "search" => &mut self.search,
            "chat" => &mut self.chat,
            "myinfo" => &mut self.myinfo,
            "myinfo_op" => &mut self.myinfo_op,
            "get_nicklist" => &mut self.get_nicklist,
            "get_info" => &mut self.get_info,
            "downloads" => &mut self.downloads,
            "search_results_in" => &mut self.search_results_in,
            "search_results_out" => &mut self.search_results_out,
            "warnings" => &mut self.warnings,
            "violations" => &mut self.violations,
            "connects" => &mut self.connects,
            _ => return None,
        })
    }

    /// Every bucket with its config name.
    pub fn named(&self) -> [(&'static str, &LeakyBucketType); 12] {
        [
            ("search", &self.search),
            ("chat", &self.chat),
            ("myinfo", &self.myinfo),
            ("myinfo_op", &self.myinfo_op),
            ("get_nicklist", &self.get_nicklist),
            ("get_info", &self.get_info),
            ("downloads", &self.downloads),
            ("search_results_in", &self.search_results_in),
            ("search_results_out", &self.search_results_out),
            ("warnings", &self.warnings),
            ("violations", &self.violations),
            ("connects", &self.connects),
        ]
    }

    /// Bucket names in config order.
    pub const NAMES: [&'static str; 12] = [
        "search",
        "chat",
        "myinfo",
        "myinfo_op",
        "get_nicklist",
        "get_info",
        "downloads",
        "search_results_in",
        "search_results_out",
        "warnings",
        "violations",
        "connects",
    ];
}

impl Default for RatesConfig {
    fn default() -> Self {
        Self {
            search: default_search(),
            chat: default_chat(),
            myinfo: default_myinfo(),
            myinfo_op: default_myinfo_op(),
            get_nicklist: default_get_nicklist(),
            get_info: default_get_info(),
            downloads: default_downloads(),
            search_results_in: default_search_results_in(),
            search_results_out: default_search_results_out(),
            warnings: default_warnings(),
            violations: default_violations(),
            connects: default_connects(),
        }
    }
}

fn default_search() -> LeakyBucketType {
    LeakyBucketType::per_secs(5, 5, 1)
}

fn default_chat() -> LeakyBucketType {
    LeakyBucketType::per_secs(2, 5, 1)
}

fn default_myinfo() -> LeakyBucketType {
    LeakyBucketType::per_secs(60, 4, 1)
}

fn default_myinfo_op() -> LeakyBucketType {
    LeakyBucketType::per_secs(5, 4, 1)
}

fn default_get_nicklist() -> LeakyBucketType {
    LeakyBucketType::per_secs(60, 2, 1)
}

fn default_get_info() -> LeakyBucketType {
    LeakyBucketType::per_secs(1, 500, 100)
}

fn default_downloads() -> LeakyBucketType {
    LeakyBucketType::per_secs(1, 10, 2)
}

fn default_search_results_in() -> LeakyBucketType {
    LeakyBucketType::per_secs(1, 100, 50)
}

fn default_search_results_out() -> LeakyBucketType {
    LeakyBucketType::per_secs(1, 50, 25)
}

fn default_warnings() -> LeakyBucketType {
    LeakyBucketType::per_secs(10, 1, 1)
}

fn default_violations() -> LeakyBucketType {
    LeakyBucketType::per_secs(60, 5, 1)
}

fn default_connects() -> LeakyBucketType {
    LeakyBucketType::per_secs(1, 50, 20)
}
