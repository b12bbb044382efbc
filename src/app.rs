use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, Context as _, Result};
use chrono::{Local, NaiveDate};
use eframe::egui::{
    self, Align2, CentralPanel, ColorImage, TextEdit, TextureHandle, TextureOptions, TopBottomPanel,
};
use egui_extras::{Column, DatePickerButton, TableBuilder};
use log::{error, info, warn};

use crate::capture::{NokhwaBackend, Session, Waker};
use crate::config::Config;
use crate::decode::QrDecoder;
use crate::error::{CaptureError, StoreError};
use crate::export::ExportTable;
use crate::notify::SoundNotifier;
use crate::overlay;
use crate::scanner::{ScanEffects, Scanner};
use crate::store::{ScanRecord, ScanStore, DATE_FORMAT};

const WINDOW_TITLE: &str = "Webcam Barcode & QR Scanner";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NoticeLevel {
    Info,
    Error,
}

/// Modal message; the rest of the window is disabled until it is acknowledged.
/// Notices queue up and are shown one at a time, oldest first.
#[derive(Debug, Clone)]
struct Notice {
    level: NoticeLevel,
    title: String,
    message: String,
}

impl Notice {
    fn info(title: &str, message: impl Into<String>) -> Self {
        Notice {
            level: NoticeLevel::Info,
            title: title.to_string(),
            message: message.into(),
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Notice {
            level: NoticeLevel::Error,
            title: "Lỗi".to_string(),
            message: message.into(),
        }
    }
}

struct PendingExport {
    table: ExportTable,
    path: String,
}

/// Scan side effects as seen by the window.
struct UiEffects<'a> {
    ctx: &'a egui::Context,
    result_text: &'a mut String,
    history: &'a mut Vec<ScanRecord>,
    notifier: &'a SoundNotifier,
    notices: &'a mut VecDeque<Notice>,
}

impl ScanEffects for UiEffects<'_> {
    fn show_result(&mut self, text: &str) {
        *self.result_text = text.to_string();
    }

    fn copy_to_clipboard(&mut self, text: &str) {
        self.ctx.copy_text(text.to_string());
    }

    fn play_sound(&mut self, _text: &str) {
        self.notifier.play();
    }

    fn refresh_history(&mut self, records: Vec<ScanRecord>) {
        *self.history = records;
    }

    fn store_failed(&mut self, err: &StoreError) {
        self.notices.push_back(Notice::error(format!("Không thể lưu kết quả quét: {err}")));
    }
}

fn repaint_waker(ctx: &egui::Context) -> Waker {
    let ctx = ctx.clone();
    Arc::new(move || ctx.request_repaint())
}

struct ScannerApp {
    scanner: Scanner,
    notifier: SoundNotifier,
    preview: Option<TextureHandle>,
    preview_seq: Option<u64>,
    result_text: String,
    history: Vec<ScanRecord>,
    from_date: NaiveDate,
    to_date: NaiveDate,
    export_dir: PathBuf,
    pending_export: Option<PendingExport>,
    notices: VecDeque<Notice>,
}

impl ScannerApp {
    fn new(scanner: Scanner, notifier: SoundNotifier, config: &Config) -> Self {
        let today = Local::now().date_naive();
        let mut app = ScannerApp {
            scanner,
            notifier,
            preview: None,
            preview_seq: None,
            result_text: String::new(),
            history: Vec::new(),
            from_date: today,
            to_date: today,
            export_dir: config.export_dir.clone(),
            pending_export: None,
            notices: VecDeque::new(),
        };

        match app.scanner.history() {
            Ok(history) => app.history = history,
            Err(e) => {
                error!("failed to load history: {e}");
                app.notices.push_back(Notice::error(format!("Không thể đọc lịch sử quét: {e}")));
            }
        }

        match app
            .scanner
            .session_mut()
            .refresh_devices(config.camera.as_deref())
        {
            Ok(_) => {}
            Err(CaptureError::NoDevice) => {
                warn!("no camera found");
                app.notices.push_back(Notice::error("Không tìm thấy webcam nào!"));
            }
            Err(e) => {
                error!("camera query failed: {e}");
                app.notices.push_back(Notice::error(format!("Lỗi khi tìm camera: {e}")));
            }
        }

        app
    }

    fn toggle_capture(&mut self, ctx: &egui::Context) {
        if let Err(e) = self.scanner.toggle(repaint_waker(ctx), Instant::now()) {
            error!("start failed: {e}");
            self.notices.push_back(Notice::error(format!("Lỗi khi khởi động camera: {e}")));
        }
        if !self.scanner.is_running() {
            self.clear_preview();
        }
    }

    fn clear_preview(&mut self) {
        self.preview = None;
        self.preview_seq = None;
    }

    fn run_timer(&mut self, ctx: &egui::Context, now: Instant) {
        let mut effects = UiEffects {
            ctx,
            result_text: &mut self.result_text,
            history: &mut self.history,
            notifier: &self.notifier,
            notices: &mut self.notices,
        };
        self.scanner.poll(now, &mut effects);
    }

    fn refresh_preview(&mut self, ctx: &egui::Context) {
        let Some(frame) = self.scanner.session().current_frame() else {
            self.clear_preview();
            return;
        };
        if self.preview_seq == Some(frame.seq) {
            return;
        }
        self.preview_seq = Some(frame.seq);

        let Some(rgba) = overlay::compose(&frame.image, self.scanner.overlay()) else {
            return;
        };
        let size = [rgba.width() as usize, rgba.height() as usize];
        let image = ColorImage::from_rgba_unmultiplied(size, rgba.as_raw());
        match &mut self.preview {
            Some(texture) => texture.set(image, TextureOptions::LINEAR),
            None => self.preview = Some(ctx.load_texture("preview", image, TextureOptions::LINEAR)),
        }
    }

    fn device_bar(&mut self, ui: &mut egui::Ui, ctx: &egui::Context) {
        ui.horizontal(|ui| {
            ui.label("Chọn Camera:");

            let session = self.scanner.session();
            let devices = session.devices().to_vec();
            let mut selected = session.selected();
            let current = devices.get(selected).map(|d| d.name.as_str()).unwrap_or("");

            ui.add_enabled_ui(session.selection_enabled() && !devices.is_empty(), |ui| {
                egui::ComboBox::new("device", "")
                    .selected_text(current)
                    .width(420.0)
                    .show_ui(ui, |ui| {
                        for (i, device) in devices.iter().enumerate() {
                            ui.selectable_value(&mut selected, i, &device.name);
                        }
                    });
            });
            if selected != self.scanner.session().selected() {
                self.scanner.session_mut().select(selected);
            }

            let toggle = egui::Button::new(self.scanner.session().toggle_label());
            if ui
                .add_enabled(self.scanner.session().can_start(), toggle)
                .clicked()
            {
                self.toggle_capture(ctx);
            }
        });
    }

    fn result_row(&mut self, ui: &mut egui::Ui) {
        ui.label("Kết quả quét gần nhất:");
        ui.add(TextEdit::singleline(&mut self.result_text.as_str()).desired_width(f32::INFINITY));
    }

    fn history_table(&mut self, ui: &mut egui::Ui) {
        ui.label("Lịch sử quét:");
        TableBuilder::new(ui)
            .striped(true)
            .resizable(true)
            .max_scroll_height(170.0)
            .column(Column::initial(50.0))
            .column(Column::initial(420.0).clip(true))
            .column(Column::initial(110.0))
            .column(Column::remainder())
            .header(20.0, |mut header| {
                for title in ["STT", "Kết quả", "Ngày quét", "Giờ quét"] {
                    header.col(|ui| {
                        ui.strong(title);
                    });
                }
            })
            .body(|body| {
                body.rows(18.0, self.history.len(), |mut row| {
                    let record = &self.history[row.index()];
                    row.col(|ui| {
                        ui.label(record.id.to_string());
                    });
                    row.col(|ui| {
                        ui.label(&record.text);
                    });
                    row.col(|ui| {
                        ui.label(&record.scan_date);
                    });
                    row.col(|ui| {
                        ui.label(&record.scan_time);
                    });
                });
            });
    }

    fn export_bar(&mut self, ui: &mut egui::Ui) {
        ui.group(|ui| {
            ui.label("Xuất Báo Cáo");
            ui.horizontal(|ui| {
                ui.label("Từ:");
                ui.push_id("from_date", |ui| ui.add(DatePickerButton::new(&mut self.from_date)));
                ui.label("Đến:");
                ui.push_id("to_date", |ui| ui.add(DatePickerButton::new(&mut self.to_date)));
                if ui.button("Xuất Excel").clicked() {
                    self.begin_export();
                }
            });
        });
    }

    fn begin_export(&mut self) {
        match ExportTable::collect(self.scanner.store(), self.from_date, self.to_date) {
            Ok(table) if table.is_empty() => {
                self.notices.push_back(Notice::info(
                    "Thông báo",
                    "Không có dữ liệu để xuất trong khoảng thời gian đã chọn.",
                ));
            }
            Ok(table) => {
                let path = self.export_dir.join(table.default_file_name());
                self.pending_export = Some(PendingExport {
                    path: path.display().to_string(),
                    table,
                });
            }
            Err(e) => {
                error!("export query failed: {e}");
                self.notices.push_back(Notice::error(format!("Đã xảy ra lỗi khi xuất file: {e}")));
            }
        }
    }

    fn export_window(&mut self, ctx: &egui::Context) {
        let Some(pending) = self.pending_export.as_mut() else {
            return;
        };

        let mut save = None;
        egui::Window::new("Lưu file Excel")
            .collapsible(false)
            .resizable(false)
            .anchor(Align2::CENTER_CENTER, [0.0, 0.0])
            .show(ctx, |ui| {
                ui.label(format!(
                    "{} dòng ({} - {})",
                    pending.table.len(),
                    pending.table.from.format(DATE_FORMAT),
                    pending.table.to.format(DATE_FORMAT)
                ));
                ui.add(TextEdit::singleline(&mut pending.path).desired_width(460.0));
                ui.horizontal(|ui| {
                    if ui.button("Lưu").clicked() {
                        save = Some(true);
                    }
                    if ui.button("Hủy").clicked() {
                        save = Some(false);
                    }
                });
            });

        match save {
            Some(true) => {
                if let Some(pending) = self.pending_export.take() {
                    self.finish_export(pending);
                }
            }
            Some(false) => self.pending_export = None,
            None => {}
        }
    }

    fn finish_export(&mut self, pending: PendingExport) {
        match pending.table.write_xlsx(Path::new(pending.path.trim())) {
            Ok(path) => {
                if let Some(dir) = path.parent() {
                    self.export_dir = dir.to_path_buf();
                }
                self.notices.push_back(Notice::info("Thành công", "Xuất file Excel thành công!"));
            }
            Err(e) => {
                error!("export failed: {e}");
                self.notices.push_back(Notice::error(format!("Đã xảy ra lỗi khi xuất file: {e}")));
            }
        }
    }

    fn notice_window(&mut self, ctx: &egui::Context) {
        let Some(notice) = self.notices.front() else {
            return;
        };

        let mut close = false;
        egui::Window::new(notice.title.as_str())
            .collapsible(false)
            .resizable(false)
            .anchor(Align2::CENTER_CENTER, [0.0, 0.0])
            .show(ctx, |ui| {
                let color = match notice.level {
                    NoticeLevel::Error => ui.visuals().error_fg_color,
                    NoticeLevel::Info => ui.visuals().text_color(),
                };
                ui.colored_label(color, &notice.message);
                if ui.button("OK").clicked() {
                    close = true;
                }
            });
        if close {
            self.notices.pop_front();
        }
    }
}

impl eframe::App for ScannerApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let now = Instant::now();

        if self.scanner.session().worker_exited() {
            self.scanner.stop();
            self.clear_preview();
            self.notices.push_back(Notice::error("Camera đã ngừng hoạt động."));
        }

        self.run_timer(ctx, now);
        self.refresh_preview(ctx);

        let enabled = self.notices.is_empty() && self.pending_export.is_none();

        TopBottomPanel::top("devices").show(ctx, |ui| {
            ui.add_enabled_ui(enabled, |ui| self.device_bar(ui, ctx));
        });
        TopBottomPanel::bottom("history").show(ctx, |ui| {
            ui.add_enabled_ui(enabled, |ui| {
                self.result_row(ui);
                ui.separator();
                self.history_table(ui);
                self.export_bar(ui);
            });
        });
        CentralPanel::default().show(ctx, |ui| {
            ui.centered_and_justified(|ui| match &self.preview {
                Some(texture) => {
                    ui.add(egui::Image::new(texture).shrink_to_fit());
                }
                None => {
                    ui.weak("Camera chưa bật");
                }
            });
        });

        self.export_window(ctx);
        self.notice_window(ctx);

        if let Some(wait) = self.scanner.next_tick_in(now) {
            ctx.request_repaint_after(wait);
        }
    }
}

pub fn run(config: Config) -> Result<()> {
    let store = match &config.database {
        Some(path) => ScanStore::open(path.clone()),
        None => ScanStore::open_default(),
    }
    .context("failed to open scan history")?;
    info!("scan history at {}", store.path().display());

    let session = Session::new(Arc::new(NokhwaBackend));
    let decoder = Box::new(QrDecoder::new(config.try_harder));
    let scanner = Scanner::new(store, session, decoder, config.scan_interval);
    let notifier = SoundNotifier::new(config.sound);

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title(WINDOW_TITLE)
            .with_inner_size([800.0, 800.0])
            .with_min_inner_size([800.0, 700.0]),
        ..Default::default()
    };

    info!("scan interval {:?}", config.scan_interval);
    eframe::run_native(
        WINDOW_TITLE,
        options,
        Box::new(move |_cc| Ok(Box::new(ScannerApp::new(scanner, notifier, &config)))),
    )
    .map_err(|e| anyhow!("window closed with error: {e}"))
}
