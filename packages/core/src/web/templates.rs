//! HTML rendering.
//!
//! Pages are assembled from plain strings; every value that came from the
//! backend or the user goes through [`escape`] on the way in. Annotation
//! markup is the exception: it is SVG the backend produced for the overlay.

use std::fmt::Write;

use axum::response::Html;

use crate::auth::User;
use crate::models::{Patient, Video, VideoMetadata, VideoSummary};
use crate::viewer::playback::FALLBACK_FPS;
use crate::viewer::summary::{cards_for, ComparisonRow, SECTIONS};

pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

const STYLE: &str = r##"
body { margin: 0; font-family: system-ui, sans-serif; background: #f3f4f6; color: #111827; }
header.nav { display: flex; justify-content: space-between; align-items: center; padding: 0.75rem 1.5rem; background: #1e3a8a; color: #fff; }
header.nav a { color: #fff; text-decoration: none; font-weight: 700; }
header.nav form { display: inline; margin-left: 1rem; }
main { max-width: 80rem; margin: 0 auto; padding: 2rem 1rem; }
.banner { padding: 0.75rem 1rem; border-radius: 0.375rem; margin-bottom: 1.5rem; }
.banner.error { background: #fee2e2; border: 1px solid #f87171; color: #b91c1c; }
.banner.success { background: #dcfce7; border: 1px solid #4ade80; color: #166534; }
.card { background: #fff; border-radius: 0.5rem; box-shadow: 0 1px 3px rgba(0,0,0,0.1); padding: 1.25rem; margin-bottom: 1.5rem; }
.grid { display: grid; grid-template-columns: repeat(auto-fill, minmax(16rem, 1fr)); gap: 1.5rem; }
table { width: 100%; border-collapse: collapse; }
th, td { text-align: left; padding: 0.6rem 0.8rem; border-bottom: 1px solid #e5e7eb; font-size: 0.9rem; }
.status-ready { color: #166534; } .status-error { color: #b91c1c; } .status-other { color: #854d0e; }
.abnormal { color: #ef4444; text-transform: capitalize; } .normal { color: #6b7280; text-transform: capitalize; }
.eye-right { color: #166534; } .eye-left { color: #1e40af; }
.viewer { display: grid; grid-template-columns: 7fr 3fr; gap: 1.5rem; }
.stage { position: relative; background: #000; }
.stage img { display: block; width: 100%; }
.stage svg.overlay { position: absolute; inset: 0; width: 100%; height: 100%; pointer-events: none; }
.frame-missing { color: #fff; padding: 4rem; text-align: center; }
.summary-card { border: 1px solid #000; border-radius: 0.25rem; padding: 0.5rem; background: #fff; }
.summary-card .title { font-size: 0.75rem; } .summary-card .value { font-size: 1.1rem; font-weight: 700; }
.param-chart { width: 100%; cursor: pointer; }
"##;

fn nav(user: Option<&User>) -> String {
    let mut html = String::from(r#"<header class="nav"><a href="/">BlinkDX</a>"#);
    if let Some(user) = user {
        let _ = write!(
            html,
            r#"<div><span class="user">{}</span><form method="post" action="/logout"><button type="submit">Sign Out</button></form></div>"#,
            escape(&user.username)
        );
    }
    html.push_str("</header>");
    html
}

/// Wrap `body` in the shared page shell.
pub fn layout(title: &str, user: Option<&User>, head_extra: &str, body: &str) -> Html<String> {
    Html(format!(
        "<!DOCTYPE html><html lang=\"en\"><head><meta charset=\"utf-8\">\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\
         <title>{title} | BlinkDX</title><style>{STYLE}</style>{head_extra}</head>\
         <body>{nav}<main>{body}</main></body></html>",
        title = escape(title),
        nav = nav(user),
    ))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BannerKind {
    Error,
    Success,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Banner {
    pub kind: BannerKind,
    pub message: String,
}

impl Banner {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: BannerKind::Error,
            message: message.into(),
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self {
            kind: BannerKind::Success,
            message: message.into(),
        }
    }

    fn render(&self) -> String {
        let class = match self.kind {
            BannerKind::Error => "error",
            BannerKind::Success => "success",
        };
        format!(
            r#"<div class="banner {}" role="alert">{}</div>"#,
            class,
            escape(&self.message)
        )
    }
}

pub fn login_page(error: Option<&str>, username: &str) -> Html<String> {
    let banner = error.map(|e| Banner::error(e).render()).unwrap_or_default();
    let body = format!(
        r#"<div class="card" style="max-width:24rem;margin:4rem auto">
<h2>Sign In</h2><p>Enter your credentials to access BlinkDX</p>{banner}
<form method="post" action="/login">
<p><label for="username">Username</label><br><input id="username" name="username" value="{username}" autocomplete="username"></p>
<p><label for="password">Password</label><br><input id="password" name="password" type="password" autocomplete="current-password"></p>
<button type="submit">Sign In</button></form></div>"#,
        username = escape(username),
    );
    layout("Sign In", None, "", &body)
}

/// Full-page error with a way back to the directory.
pub fn error_page(user: Option<&User>, heading: &str, detail: &str) -> Html<String> {
    let body = format!(
        r#"<div class="card"><h1 style="color:#dc2626">{}</h1><p>{}</p><p><a href="/">Return to Patient Directory</a></p></div>"#,
        escape(heading),
        escape(detail)
    );
    layout(heading, user, "", &body)
}

fn upload_form(patients: &[Patient]) -> String {
    let mut options = String::new();
    for patient in patients {
        let _ = write!(
            options,
            r#"<option value="{}">{}</option>"#,
            patient.id,
            escape(&patient.research_id)
        );
    }
    format!(
        r#"<section class="card"><h2>Upload a New Video</h2>
<form method="post" action="/upload" enctype="multipart/form-data">
<p><label for="patient-select">Select Patient</label><br><select id="patient-select" name="patient_id">{options}<option value="new">-- Create New Patient --</option></select></p>
<p><label for="new-patient-name">New Patient Name</label><br><input id="new-patient-name" name="research_id" placeholder="e.g., John Doe"></p>
<p><label for="video-file">Video File</label><br><input id="video-file" name="video" type="file" accept="video/*"></p>
<button type="submit">Upload Video</button></form></section>"#
    )
}

/// Patient directory. `patients` is `None` when the list could not be fetched.
pub fn patients_page(
    user: &User,
    patients: Option<&[Patient]>,
    query: &str,
    banners: &[Banner],
) -> Html<String> {
    let mut body = String::from(
        "<h1>Patient Directory</h1><p>Select a patient to view their video analyses.</p>",
    );
    for banner in banners {
        body.push_str(&banner.render());
    }
    let all = patients.unwrap_or(&[]);
    body.push_str(&upload_form(all));

    let _ = write!(
        body,
        r#"<form method="get" action="/"><input name="q" value="{}" placeholder="Search patient by ResearchID..."> <button type="submit">Search</button></form>"#,
        escape(query)
    );

    let visible: Vec<&Patient> = all.iter().filter(|p| p.matches_research_id(query)).collect();
    if patients.is_some() && visible.is_empty() {
        body.push_str("<p>No patients found.</p>");
    }
    body.push_str(r#"<div class="grid" style="margin-top:1.5rem">"#);
    for patient in visible {
        let label = patient.name.as_deref().unwrap_or(&patient.research_id);
        let _ = write!(
            body,
            r#"<div class="card"><h2><a href="/patients/{id}">Research ID: {rid}</a></h2><p>{count} video(s)</p>
<form method="post" action="/patients/{id}/delete" onsubmit="return confirm('Are you sure you want to delete patient &quot;{label}&quot;? This action cannot be undone.')"><button type="submit" aria-label="Delete patient">Delete</button></form></div>"#,
            id = patient.id,
            rid = escape(&patient.research_id),
            count = patient.video_count(),
            label = escape(label),
        );
    }
    body.push_str("</div>");
    layout("Patient Directory", Some(user), "", &body)
}

fn status_class(status: &str) -> &'static str {
    match status {
        "Ready" => "status-ready",
        "Error" => "status-error",
        _ => "status-other",
    }
}

/// A patient's videos with their summary comparison.
pub fn patient_page(
    user: &User,
    patient: &Patient,
    total_videos: usize,
    rows: &[(Video, ComparisonRow)],
    query: &str,
) -> Html<String> {
    let mut body = format!(
        r#"<p><a href="/">&larr; Back to Patient Directory</a></p><h1>Research ID: {}</h1><p>{} video{}"#,
        escape(&patient.research_id),
        total_videos,
        if total_videos == 1 { "" } else { "s" },
    );
    if total_videos > 0 {
        let _ = write!(body, " ({} showing)", rows.len());
    }
    body.push_str("</p>");

    if total_videos == 0 {
        body.push_str(r#"<div class="card"><p>No videos uploaded for this patient yet.</p></div>"#);
        return layout("Patient", Some(user), "", &body);
    }

    let _ = write!(
        body,
        r#"<form method="get"><input name="q" value="{}" placeholder="Filter videos..."> <button type="submit">Filter</button></form>"#,
        escape(query)
    );
    body.push_str(
        "<div class=\"card\"><table><thead><tr><th>File</th><th>Status</th><th>Upload Date</th>\
         <th>Peak Velocity during Closing Phase</th><th>Max Blink Amplitude</th>\
         <th>Abnormal Status</th><th>Actions</th></tr></thead><tbody>",
    );
    for (video, row) in rows {
        let status = video.latest_status();
        let _ = write!(
            body,
            r#"<tr><td>{file}</td><td class="{sclass}">{status}</td><td>{date}</td>
<td><span class="eye-right">R = {rv}</span> <span class="eye-left">L = {lv}</span></td>
<td><span class="eye-right">R = {ra}</span> <span class="eye-left">L = {la}</span></td>
<td class="{aclass}">{abnormal}</td><td><a href="/result/{id}">View Analysis</a></td></tr>"#,
            file = escape(&video.file_path),
            sclass = status_class(status),
            status = escape(status),
            date = escape(&video.upload_date()),
            rv = escape(&row.close_peak_velocity.0),
            lv = escape(&row.close_peak_velocity.1),
            ra = escape(&row.max_amplitude.0),
            la = escape(&row.max_amplitude.1),
            aclass = if row.is_abnormal { "abnormal" } else { "normal" },
            abnormal = escape(&row.abnormal_status),
            id = video.id,
        );
    }
    body.push_str("</tbody></table></div>");
    layout("Patient", Some(user), "", &body)
}

/// Shown while a video's frames are still being fetched; refreshes itself.
pub fn loading_page(user: &User, video_id: i64, loaded: usize, total: usize) -> Html<String> {
    let body = format!(
        r#"<div class="card" style="text-align:center"><h2>Loading Video Analysis...</h2>
<p>Preparing frames and data for Video ID: {video_id}</p>
<progress id="progress" value="{loaded}" max="{total}"></progress> <span id="progress-text">{loaded} / {total}</span></div>
<script>
setInterval(function () {{
  fetch('/result/{video_id}/status').then(function (r) {{
    if (r.status === 401) {{ window.location.reload(); return null; }}
    return r.json();
  }}).then(function (s) {{
    if (!s) {{ return; }}
    document.getElementById('progress').value = s.loaded;
    document.getElementById('progress-text').textContent = s.loaded + ' / ' + s.total;
    if (s.ready) {{ window.location.reload(); }}
  }});
}}, 1000);
</script>"#
    );
    layout(
        "Loading",
        Some(user),
        r#"<noscript><meta http-equiv="refresh" content="2"></noscript>"#,
        &body,
    )
}

/// Everything the review screen shows for one video.
pub struct ViewerPage<'a> {
    pub video_id: i64,
    pub metadata: &'a VideoMetadata,
    pub total_frames: usize,
    pub current: usize,
    pub prev_frame: usize,
    pub next_frame: usize,
    pub time_secs: f64,
    pub current_available: bool,
    pub annotations_json: String,
    pub current_annotation: &'a str,
    pub columns: &'a [String],
    pub selected: &'a [String],
    pub chart_svg: String,
    pub summary: &'a VideoSummary,
    pub missing_frames: usize,
}

const VIEWER_SCRIPT: &str = r#"
(function () {
  var root = document.getElementById('viewer');
  var videoId = root.dataset.video;
  var total = parseInt(root.dataset.total, 10);
  var fps = parseFloat(root.dataset.fps) || 30;
  var current = parseInt(root.dataset.current, 10);
  var annotations = JSON.parse(document.getElementById('annotations').textContent || '{}');
  var img = document.getElementById('frame');
  var missing = document.getElementById('frame-missing');
  var overlay = document.getElementById('overlay-paths');
  var scrubber = document.getElementById('scrubber');
  var playBtn = document.getElementById('play');
  var source = null;

  img.addEventListener('error', function () { img.hidden = true; missing.hidden = false; });
  img.addEventListener('load', function () { img.hidden = false; missing.hidden = true; });

  function drawAnnotation(index) {
    if (Object.prototype.hasOwnProperty.call(annotations, index)) {
      overlay.innerHTML = annotations[index];
      return;
    }
    fetch('/result/' + videoId + '/annotation/' + index)
      .then(function (r) { return r.ok ? r.text() : ''; })
      .then(function (svg) { annotations[index] = svg; if (index === current) { overlay.innerHTML = svg; } });
  }

  function moveMarker(index) {
    var chart = document.querySelector('.param-chart');
    var line = document.getElementById('current-frame-line');
    if (!chart || !line) { return; }
    var frames = parseInt(chart.dataset.frames, 10);
    var left = parseFloat(chart.dataset.plotLeft);
    var width = parseFloat(chart.dataset.plotWidth);
    var x = frames > 1 ? left + index / (frames - 1) * width : left;
    line.setAttribute('x1', x);
    line.setAttribute('x2', x);
  }

  function show(index) {
    current = Math.max(0, Math.min(index, total - 1));
    img.src = '/result/' + videoId + '/frames/' + current;
    scrubber.value = current;
    document.getElementById('frame-no').textContent = current + 1;
    document.getElementById('time').textContent = (current / fps).toFixed(2);
    drawAnnotation(current);
    moveMarker(current);
  }

  function pause() {
    if (source) {
      source.close();
      source = null;
      fetch('/result/' + videoId + '/pause', { method: 'POST' });
    }
    playBtn.textContent = 'Play';
  }

  function play() {
    source = new EventSource('/result/' + videoId + '/play?from=' + current);
    source.onmessage = function (event) { show(parseInt(event.data, 10)); };
    source.onerror = pause;
    playBtn.textContent = 'Pause';
  }

  playBtn.addEventListener('click', function () { source ? pause() : play(); });
  document.getElementById('prev').addEventListener('click', function () { pause(); show(current - 1); });
  document.getElementById('next').addEventListener('click', function () { pause(); show(current + 1); });
  scrubber.addEventListener('input', function () { pause(); show(parseInt(scrubber.value, 10)); });

  document.querySelectorAll('input[name=param]').forEach(function (box) {
    box.addEventListener('change', function () {
      var picked = Array.prototype.filter.call(document.querySelectorAll('input[name=param]'), function (b) { return b.checked; })
        .map(function (b) { return b.value; });
      window.location.search = '?params=' + encodeURIComponent(picked.join(',')) + '&frame=' + current;
    });
  });

  var chart = document.querySelector('.param-chart');
  if (chart) {
    chart.addEventListener('click', function (event) {
      var box = chart.getBoundingClientRect();
      var scale = box.width / chart.viewBox.baseVal.width;
      var left = parseFloat(chart.dataset.plotLeft) * scale;
      var width = parseFloat(chart.dataset.plotWidth) * scale;
      var frames = parseInt(chart.dataset.frames, 10);
      var ratio = (event.clientX - box.left - left) / width;
      if (ratio >= 0 && ratio <= 1) { pause(); show(Math.round(ratio * (frames - 1))); }
    });
  }
})();
"#;

pub fn viewer_page(user: &User, page: &ViewerPage<'_>) -> Html<String> {
    let meta = page.metadata;
    let fps = if meta.fps > 0.0 { meta.fps } else { FALLBACK_FPS };
    let mut body = String::new();

    if page.missing_frames > 0 {
        body.push_str(
            &Banner::error(format!(
                "{} of {} frames could not be loaded.",
                page.missing_frames, page.total_frames
            ))
            .render(),
        );
    }

    let _ = write!(
        body,
        r#"<div id="viewer" class="viewer" data-video="{id}" data-total="{total}" data-fps="{fps}" data-current="{current}">
<section><div class="card"><h2>{file}</h2><div class="stage">
<img id="frame" src="/result/{id}/frames/{current}" alt="Frame {frame_no}"{img_hidden}>
<div id="frame-missing" class="frame-missing"{missing_hidden}>Frame unavailable</div>
<svg class="overlay" viewBox="0 0 {w} {h}" preserveAspectRatio="none"><g id="overlay-paths" stroke="lime" stroke-width="2" fill="none">{annotation}</g></svg>
</div>
<input id="scrubber" type="range" min="0" max="{max}" value="{current}" style="width:100%">
<p><button id="prev" type="button">Prev</button> <button id="play" type="button">Play</button> <button id="next" type="button">Next</button>
<span>Frame: <span id="frame-no">{frame_no}</span> / {total}</span> <span>Time: <span id="time">{time:.2}</span>s</span></p>
<noscript><p><a href="/result/{id}?frame={prev}">Previous frame</a> | <a href="/result/{id}?frame={next}">Next frame</a></p></noscript></div>"#,
        id = page.video_id,
        total = page.total_frames,
        fps = fps,
        current = page.current,
        file = escape(&meta.file_path),
        frame_no = page.current + 1,
        img_hidden = if page.current_available { "" } else { " hidden" },
        missing_hidden = if page.current_available { " hidden" } else { "" },
        w = meta.width,
        h = meta.height,
        annotation = page.current_annotation,
        max = page.total_frames.saturating_sub(1),
        prev = page.prev_frame,
        next = page.next_frame,
        time = page.time_secs,
    );

    body.push_str(r#"<div class="card"><h3>Parameters</h3><p>"#);
    for column in page.columns {
        let checked = if page.selected.contains(column) { " checked" } else { "" };
        let _ = write!(
            body,
            r#"<label><input type="checkbox" name="param" value="{v}"{checked}> {v}</label> "#,
            v = escape(column),
        );
    }
    let _ = write!(body, "</p>{}</div></section>", page.chart_svg);

    body.push_str(r#"<aside class="card"><h2>Blink Analysis Summary</h2>"#);
    for section in SECTIONS {
        let _ = write!(body, "<h3>{}</h3><div class=\"grid\" style=\"grid-template-columns:1fr 1fr;gap:0.5rem\">", escape(section.heading));
        for card in cards_for(section, page.summary) {
            let unit = if card.unit.is_empty() {
                String::new()
            } else {
                format!(" <small>{}</small>", escape(card.unit))
            };
            let _ = write!(
                body,
                r#"<div class="summary-card {class}"><div class="title">{title}</div><div class="value">{value}{unit}</div></div>"#,
                class = card.eye.css_class(),
                title = escape(card.title),
                value = escape(&card.value),
            );
        }
        body.push_str("</div>");
    }
    body.push_str("</aside></div>");

    let _ = write!(
        body,
        r#"<script type="application/json" id="annotations">{}</script><script>{}</script>"#,
        page.annotations_json.replace("</", "<\\/"),
        VIEWER_SCRIPT
    );

    layout("Video Analysis", Some(user), "", &body)
}
