/// テーブル表示モジュール
///
/// comfy-tableを使用した表形式の出力
use crate::core::metadata::{
    BackupKind, BackupRecord, BackupStatus, FileSearchHit, LogLevel, LogRecord, StoreStatistics,
};
use comfy_table::{presets::UTF8_FULL, Cell, CellAlignment, Color, ContentArrangement, Table};

/// バイト数を人間可読な形式にフォーマット
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes}B")
    } else {
        format!("{value:.1}{}", UNITS[unit])
    }
}

fn status_cell(status: BackupStatus) -> Cell {
    match status {
        BackupStatus::Completed => Cell::new("完了").fg(Color::Green),
        BackupStatus::Running => Cell::new("実行中").fg(Color::Yellow),
        BackupStatus::Failed => Cell::new("失敗").fg(Color::Red),
        BackupStatus::Partial => Cell::new("部分的").fg(Color::Yellow),
    }
}

fn kind_cell(kind: BackupKind) -> Cell {
    match kind {
        BackupKind::Full => Cell::new("フル"),
        BackupKind::Incremental => Cell::new("増分").fg(Color::Cyan),
    }
}

/// バックアップ一覧をテーブル表示
pub fn display_backups(backups: &[BackupRecord]) {
    if backups.is_empty() {
        println!("バックアップが登録されていません");
        return;
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("ID").set_alignment(CellAlignment::Right),
            Cell::new("バックアップ"),
            Cell::new("種別").set_alignment(CellAlignment::Center),
            Cell::new("ステータス").set_alignment(CellAlignment::Center),
            Cell::new("ファイル数").set_alignment(CellAlignment::Right),
            Cell::new("元サイズ").set_alignment(CellAlignment::Right),
            Cell::new("圧縮後").set_alignment(CellAlignment::Right),
            Cell::new("ベース").set_alignment(CellAlignment::Right),
        ]);

    for backup in backups {
        let base = backup
            .base_backup_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "-".to_string());

        table.add_row(vec![
            Cell::new(backup.id.to_string()).set_alignment(CellAlignment::Right),
            Cell::new(backup.backup_id_string()),
            kind_cell(backup.kind).set_alignment(CellAlignment::Center),
            status_cell(backup.status).set_alignment(CellAlignment::Center),
            Cell::new(backup.files_total.to_string()).set_alignment(CellAlignment::Right),
            Cell::new(format_bytes(backup.size_original.max(0) as u64))
                .set_alignment(CellAlignment::Right),
            Cell::new(format_bytes(backup.size_compressed.max(0) as u64))
                .set_alignment(CellAlignment::Right),
            Cell::new(base).set_alignment(CellAlignment::Right),
        ]);
    }

    println!("\n📋 バックアップ一覧");
    println!("{table}\n");
}

/// ファイル検索結果をテーブル表示
pub fn display_search_hits(hits: &[FileSearchHit]) {
    if hits.is_empty() {
        println!("一致するファイルが見つかりませんでした");
        return;
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("バックアップ").set_alignment(CellAlignment::Right),
            Cell::new("種別").set_alignment(CellAlignment::Center),
            Cell::new("相対パス"),
            Cell::new("サイズ").set_alignment(CellAlignment::Right),
            Cell::new("更新日時"),
        ]);

    for hit in hits {
        let deleted_marker = if hit.file.is_deleted { " (削除)" } else { "" };
        table.add_row(vec![
            Cell::new(hit.file.backup_id.to_string()).set_alignment(CellAlignment::Right),
            kind_cell(hit.backup_kind).set_alignment(CellAlignment::Center),
            Cell::new(format!("{}{deleted_marker}", hit.file.relative_path)),
            Cell::new(format_bytes(hit.file.file_size.max(0) as u64))
                .set_alignment(CellAlignment::Right),
            Cell::new(hit.file.modified.format("%Y-%m-%d %H:%M:%S").to_string()),
        ]);
    }

    println!("\n🔍 検索結果: {}件", hits.len());
    println!("{table}\n");
}

/// ログエントリをテーブル表示
pub fn display_logs(logs: &[LogRecord]) {
    if logs.is_empty() {
        println!("ログがありません");
        return;
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("日時"),
            Cell::new("レベル").set_alignment(CellAlignment::Center),
            Cell::new("メッセージ"),
            Cell::new("バックアップ").set_alignment(CellAlignment::Right),
        ]);

    for log in logs {
        let level_cell = match log.level {
            LogLevel::Error | LogLevel::Critical => Cell::new(log.level.as_str()).fg(Color::Red),
            LogLevel::Warning => Cell::new(log.level.as_str()).fg(Color::Yellow),
            _ => Cell::new(log.level.as_str()),
        };

        table.add_row(vec![
            Cell::new(log.timestamp.format("%Y-%m-%d %H:%M:%S").to_string()),
            level_cell.set_alignment(CellAlignment::Center),
            Cell::new(&log.message),
            Cell::new(
                log.backup_id
                    .map(|id| id.to_string())
                    .unwrap_or_else(|| "-".to_string()),
            )
            .set_alignment(CellAlignment::Right),
        ]);
    }

    println!("{table}\n");
}

/// ストア統計を表示
pub fn display_statistics(stats: &StoreStatistics) {
    println!("\n📊 統計");
    println!("  バックアップ数: {} (完了: {})", stats.total_backups, stats.completed_backups);
    println!("  ファイルレコード数: {}", stats.total_files);
    println!(
        "  合計サイズ: {} → {}",
        format_bytes(stats.total_size_original.max(0) as u64),
        format_bytes(stats.total_size_compressed.max(0) as u64)
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0B");
        assert_eq!(format_bytes(512), "512B");
        assert_eq!(format_bytes(2048), "2.0KiB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0MiB");
    }
}
