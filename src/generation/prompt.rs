//! Guide template, prompt composition and fallback text.

use std::path::Path;

use tracing::{info, warn};

/// Placeholder replaced by the task when present in a guide.
pub const TASK_PLACEHOLDER: &str = "{{TASK}}";

/// Guide used when no guide file is available.
pub const DEFAULT_GUIDE: &str = "# 회고 작성 가이드

당신은 5년 차 프론트엔드 개발자입니다.
아래 \"오늘 한 일\"을 바탕으로 회고 텍스트를 작성해주세요.

## 작성 규칙
1. 말투는 담백하고 전문적으로 작성할 것.
2. '문제 -> 해결 -> 배운 점' 구조를 유지할 것.
3. 너무 길지 않게 3~5줄 내외로 요약할 것.
4. 이모지는 쓰지마. ** 이런것도 쓰지말고.

[느끼다, 깨우다, 바꾸다] 형식으로 작성해주세요.";

/// Where a [`Guide`] came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuideSource {
    /// Read from a file
    File(std::path::PathBuf),
    /// The built-in default
    Builtin,
}

/// Instructions prepended to every prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Guide {
    text: String,
    source: GuideSource,
}

impl Guide {
    /// The built-in guide.
    #[must_use]
    pub fn builtin() -> Self {
        Self {
            text: DEFAULT_GUIDE.to_string(),
            source: GuideSource::Builtin,
        }
    }

    /// Loads `path`, falling back to the built-in guide if it cannot be
    /// read or is blank.
    #[must_use]
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(text) if !text.trim().is_empty() => {
                info!(path = %path.display(), "loaded guide");
                Self {
                    text,
                    source: GuideSource::File(path.to_path_buf()),
                }
            }
            Ok(_) => {
                warn!(path = %path.display(), "guide file is empty; using built-in guide");
                Self::builtin()
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "guide file unavailable; using built-in guide");
                Self::builtin()
            }
        }
    }

    /// Loads `path` when given, otherwise the built-in guide.
    #[must_use]
    pub fn load_optional(path: Option<&Path>) -> Self {
        path.map_or_else(Self::builtin, Self::load)
    }

    /// Guide text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Where the text came from.
    #[must_use]
    pub const fn source(&self) -> &GuideSource {
        &self.source
    }
}

/// Builds the prompt sent upstream.
///
/// A guide containing [`TASK_PLACEHOLDER`] gets the task substituted in
/// place. Otherwise the task is appended under a "오늘 한 일" heading,
/// followed by the writing request.
#[must_use]
pub fn compose_prompt(guide: &str, task: &str) -> String {
    if guide.contains(TASK_PLACEHOLDER) {
        return guide.replace(TASK_PLACEHOLDER, task);
    }
    format!("{guide}\n\n오늘 한 일:\n{task}\n\n위 내용을 바탕으로 회고를 작성해주세요.")
}

/// Deterministic text returned whenever generation fails.
///
/// Always non-empty and always mentions the task.
#[must_use]
pub fn fallback_text(task: &str) -> String {
    format!(
        "[느끼다]

오늘은 \"{task}\"을(를) 진행했다. 계획한 작업을 차근차근 수행하면서 목표를 달성할 수 있었고, 과정에서 기술적으로 성장하는 계기가 되었다. 작업을 마친 뒤 결과물을 보니 전체적인 완성도가 높아졌다는 확신이 들어 뿌듯했다.

[깨우다]

이번 작업의 핵심은 단순히 기능을 구현하는 것이 아니라, 사용자 관점에서 완성도를 높이는 것이었다. 세부적인 부분에 집중한 덕분에 전체 품질이 향상되었다는 것을 체감했다.

[바꾸다]

다음부터는 작업 시작 전 \"이 작업이 사용자에게 어떤 가치를 줄까?\"를 먼저 고민해야겠다. 목적 중심으로 접근하면 더 빠르고 효율적으로 결과물을 만들 수 있을 것이다."
    )
}
