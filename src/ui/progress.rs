//! バックアップ・リストア進捗表示機能
//!
//! indicatifライブラリを使用して、エンジンの進捗スナップショットを
//! リアルタイムのプログレスバーとして表示します。

use crate::core::backup::BackupProgress;
use crate::core::restore::RestoreProgress;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::time::Duration;

/// 進捗表示
///
/// - メインプログレスバー: フェーズと全体の進捗を表示
/// - 詳細プログレスバー: 現在処理中のファイルを表示
///
/// # 使用例
///
/// ```no_run
/// use scrat_backup::ui::progress::ProgressDisplay;
///
/// let display = ProgressDisplay::new();
/// let observer = display.clone();
/// // engine.with_progress_callback(move |p| observer.update_backup(&p)) ...
/// display.finish("バックアップ完了");
/// ```
#[derive(Clone)]
pub struct ProgressDisplay {
    #[allow(dead_code)]
    multi: Arc<MultiProgress>,
    main_bar: ProgressBar,
    detail_bar: ProgressBar,
}

impl ProgressDisplay {
    /// 新しいProgressDisplayを作成
    #[must_use]
    pub fn new() -> Self {
        let multi = Arc::new(MultiProgress::new());

        let main_bar = multi.add(ProgressBar::new(0));
        main_bar.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} ファイル {msg}")
                .unwrap()
                .progress_chars("█▉▊▋▌▍▎▏  "),
        );
        main_bar.enable_steady_tick(Duration::from_millis(100));

        let detail_bar = multi.add(ProgressBar::new(0));
        detail_bar.set_style(ProgressStyle::default_bar().template("{wide_msg}").unwrap());

        Self {
            multi,
            main_bar,
            detail_bar,
        }
    }

    /// バックアップ進捗スナップショットを反映
    pub fn update_backup(&self, progress: &BackupProgress) {
        self.main_bar.set_length(progress.files_total as u64);
        self.main_bar.set_position(progress.files_processed as u64);
        self.main_bar
            .set_message(format!("[{}]", progress.phase));
        if let Some(current) = &progress.current_file {
            self.detail_bar.set_message(format!("処理中: {current}"));
        }
    }

    /// リストア進捗スナップショットを反映
    pub fn update_restore(&self, progress: &RestoreProgress) {
        self.main_bar.set_length(progress.files_total as u64);
        self.main_bar.set_position(progress.files_processed as u64);
        self.main_bar
            .set_message(format!("[{}]", progress.phase));
        if let Some(current) = &progress.current_file {
            self.detail_bar.set_message(format!("処理中: {current}"));
        }
    }

    /// 進捗表示を完了させる
    pub fn finish(&self, message: &str) {
        self.detail_bar.finish_and_clear();
        self.main_bar.finish_with_message(message.to_string());
    }
}

impl Default for ProgressDisplay {
    fn default() -> Self {
        Self::new()
    }
}
