use crate::models::{AuthStatus, RedirectUriInfo};
use html_escape::{encode_double_quoted_attribute, encode_text};

pub fn render_index(status: &AuthStatus, update_interval_secs: u64) -> String {
    let (auth_label, auth_class) = if status.authenticated {
        ("Authorized", "ok")
    } else {
        ("Not authorized", "warn")
    };

    INDEX_HTML
        .replace("{{STYLE}}", STYLE)
        .replace("{{AUTH_LABEL}}", auth_label)
        .replace("{{AUTH_CLASS}}", auth_class)
        .replace("{{AUTH_MESSAGE}}", &encode_text(&status.message))
        .replace("{{INTERVAL}}", &update_interval_secs.to_string())
}

pub fn render_config(status: &AuthStatus, redirect: &RedirectUriInfo) -> String {
    let source = if redirect.is_runtime {
        "set at runtime"
    } else {
        "from the environment"
    };

    CONFIG_HTML
        .replace("{{STYLE}}", STYLE)
        .replace("{{AUTH_MESSAGE}}", &encode_text(&status.message))
        .replace(
            "{{REDIRECT_URI_ATTR}}",
            &encode_double_quoted_attribute(&redirect.redirect_uri),
        )
        .replace("{{REDIRECT_URI}}", &encode_text(&redirect.redirect_uri))
        .replace("{{REDIRECT_SOURCE}}", source)
}

pub fn render_terms(date: &str) -> String {
    TERMS_HTML
        .replace("{{STYLE}}", STYLE)
        .replace("{{DATE}}", &encode_text(date))
}

pub fn render_privacy(date: &str) -> String {
    PRIVACY_HTML
        .replace("{{STYLE}}", STYLE)
        .replace("{{DATE}}", &encode_text(date))
}

const STYLE: &str = r#"
    @import url('https://fonts.googleapis.com/css2?family=Space+Grotesk:wght@400;500;600&family=Fraunces:wght@600&display=swap');

    :root {
      --bg-1: #0f0f14;
      --bg-2: #25101a;
      --ink: #f4f1ee;
      --muted: #a19b95;
      --accent: #ff0050;
      --accent-2: #00f2ea;
      --card: rgba(26, 26, 34, 0.9);
      --shadow: 0 24px 60px rgba(0, 0, 0, 0.45);
    }

    * {
      box-sizing: border-box;
    }

    body {
      margin: 0;
      min-height: 100vh;
      background: radial-gradient(circle at top, var(--bg-2), transparent 60%),
        linear-gradient(135deg, var(--bg-1), #16161d 60%, #101016 100%);
      color: var(--ink);
      font-family: "Space Grotesk", "Trebuchet MS", sans-serif;
      display: grid;
      place-items: start center;
      padding: 32px 18px 48px;
    }

    .app {
      width: min(1180px, 100%);
      background: var(--card);
      border-radius: 28px;
      box-shadow: var(--shadow);
      padding: 36px;
      display: grid;
      gap: 24px;
      animation: rise 600ms ease;
    }

    header {
      display: flex;
      flex-wrap: wrap;
      justify-content: space-between;
      align-items: flex-end;
      gap: 12px;
    }

    h1 {
      font-family: "Fraunces", "Georgia", serif;
      font-weight: 600;
      font-size: clamp(1.8rem, 4vw, 2.6rem);
      margin: 0;
    }

    .subtitle {
      margin: 4px 0 0;
      color: var(--muted);
    }

    .badge {
      border-radius: 999px;
      padding: 6px 14px;
      font-size: 0.85rem;
      font-weight: 600;
    }

    .badge.ok {
      background: rgba(0, 242, 234, 0.15);
      color: var(--accent-2);
    }

    .badge.warn {
      background: rgba(255, 0, 80, 0.15);
      color: var(--accent);
    }

    .panel {
      display: grid;
      grid-template-columns: repeat(auto-fit, minmax(160px, 1fr));
      gap: 14px;
    }

    .stat {
      background: rgba(255, 255, 255, 0.04);
      border-radius: 18px;
      padding: 16px;
      border: 1px solid rgba(255, 255, 255, 0.06);
      display: grid;
      gap: 6px;
    }

    .stat .label {
      font-size: 0.8rem;
      text-transform: uppercase;
      letter-spacing: 0.12em;
      color: var(--muted);
    }

    .stat .value {
      font-size: 1.6rem;
      font-weight: 600;
    }

    .actions {
      display: flex;
      flex-wrap: wrap;
      gap: 12px;
    }

    button, .button {
      border: none;
      border-radius: 14px;
      padding: 12px 20px;
      font: inherit;
      font-weight: 600;
      cursor: pointer;
      background: var(--accent);
      color: white;
      text-decoration: none;
    }

    button.secondary, .button.secondary {
      background: rgba(255, 255, 255, 0.08);
      color: var(--ink);
    }

    input {
      width: 100%;
      border-radius: 12px;
      border: 1px solid rgba(255, 255, 255, 0.12);
      background: rgba(0, 0, 0, 0.25);
      color: var(--ink);
      padding: 12px 14px;
      font: inherit;
    }

    label {
      display: grid;
      gap: 6px;
      color: var(--muted);
      font-size: 0.9rem;
    }

    table {
      width: 100%;
      border-collapse: collapse;
      font-size: 0.92rem;
    }

    th, td {
      text-align: left;
      padding: 10px 8px;
      border-bottom: 1px solid rgba(255, 255, 255, 0.06);
      vertical-align: top;
    }

    th {
      color: var(--muted);
      font-weight: 500;
      text-transform: uppercase;
      font-size: 0.75rem;
      letter-spacing: 0.08em;
    }

    td.num {
      font-variant-numeric: tabular-nums;
    }

    .table-wrap {
      overflow-x: auto;
    }

    .status {
      min-height: 1.4em;
      color: var(--muted);
    }

    .status[data-type="error"] {
      color: var(--accent);
    }

    .status[data-type="demo"] {
      color: #ffb020;
    }

    .hint {
      margin: 0;
      color: var(--muted);
      font-size: 0.85rem;
    }

    code {
      background: rgba(255, 255, 255, 0.08);
      border-radius: 6px;
      padding: 2px 6px;
      word-break: break-all;
    }

    @keyframes rise {
      from {
        opacity: 0;
        transform: translateY(16px);
      }
      to {
        opacity: 1;
        transform: translateY(0);
      }
    }

    @media (max-width: 640px) {
      .app {
        padding: 26px 18px;
      }
    }
"#;

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="UTF-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1.0" />
  <title>TikTok Analytics Dashboard</title>
  <style>{{STYLE}}</style>
</head>
<body>
  <main class="app">
    <header>
      <div>
        <h1>TikTok Analytics</h1>
        <p class="subtitle">{{AUTH_MESSAGE}}</p>
      </div>
      <span class="badge {{AUTH_CLASS}}" id="auth-badge">{{AUTH_LABEL}}</span>
    </header>

    <section class="actions">
      <a class="button" href="/auth">Authorize TikTok</a>
      <button class="secondary" id="refresh-btn" type="button">Refresh now</button>
      <a class="button secondary" href="/config">Settings</a>
    </section>

    <section class="panel">
      <div class="stat">
        <span class="label">Videos</span>
        <span class="value" id="total-videos">0</span>
      </div>
      <div class="stat">
        <span class="label">Views</span>
        <span class="value" id="total-views">0</span>
      </div>
      <div class="stat">
        <span class="label">Likes</span>
        <span class="value" id="total-likes">0</span>
      </div>
      <div class="stat">
        <span class="label">Avg engagement</span>
        <span class="value" id="avg-engagement">0%</span>
      </div>
    </section>

    <div class="status" id="status"></div>

    <section class="table-wrap">
      <table>
        <thead>
          <tr>
            <th>Video</th>
            <th>Published</th>
            <th>Views</th>
            <th>Likes</th>
            <th>Comments</th>
            <th>Shares</th>
            <th>Engagement</th>
            <th>Avg watch (est.)</th>
            <th>Completion (est.)</th>
            <th>Bounce (est.)</th>
          </tr>
        </thead>
        <tbody id="videos"></tbody>
      </table>
    </section>

    <p class="hint">Updates are pushed every {{INTERVAL}}s. Watch time, completion and bounce are estimates derived from engagement.</p>
  </main>

  <script>
    const statusEl = document.getElementById('status');
    const videosEl = document.getElementById('videos');
    const refreshBtn = document.getElementById('refresh-btn');
    let socket = null;

    const setStatus = (message, type) => {
      statusEl.textContent = message;
      statusEl.dataset.type = type || '';
    };

    const escapeHtml = (value) => String(value ?? '').replace(/[&<>"']/g, (ch) => ({
      '&': '&amp;', '<': '&lt;', '>': '&gt;', '"': '&quot;', "'": '&#39;'
    }[ch]));

    const formatNumber = (value) => Number(value || 0).toLocaleString();

    const render = (snapshot) => {
      const videos = snapshot.videos || [];
      const type = snapshot.status === 'error' ? 'error' : (snapshot.synthetic ? 'demo' : '');
      setStatus(`${snapshot.message} (${new Date(snapshot.timestamp).toLocaleTimeString()})`, type);

      const views = videos.reduce((sum, v) => sum + v.views, 0);
      const likes = videos.reduce((sum, v) => sum + v.likes, 0);
      const engagement = videos.length
        ? videos.reduce((sum, v) => sum + v.engagement_rate, 0) / videos.length
        : 0;
      document.getElementById('total-videos').textContent = videos.length;
      document.getElementById('total-views').textContent = formatNumber(views);
      document.getElementById('total-likes').textContent = formatNumber(likes);
      document.getElementById('avg-engagement').textContent = `${engagement.toFixed(2)}%`;

      videosEl.innerHTML = videos.map((v) => `
        <tr>
          <td><a href="${escapeHtml(v.share_url)}" target="_blank" rel="noopener">${escapeHtml(v.title || v.description || v.video_id)}</a></td>
          <td>${v.publish_time ? new Date(v.publish_time).toLocaleDateString() : '--'}</td>
          <td class="num">${formatNumber(v.views)}</td>
          <td class="num">${formatNumber(v.likes)}</td>
          <td class="num">${formatNumber(v.comments)}</td>
          <td class="num">${formatNumber(v.shares)}</td>
          <td class="num">${v.engagement_rate}%</td>
          <td class="num">${v.avg_watch_time}s</td>
          <td class="num">${v.completion_rate}%</td>
          <td class="num">${v.bounce_rate}%</td>
        </tr>`).join('');
    };

    const connect = () => {
      const scheme = location.protocol === 'https:' ? 'wss' : 'ws';
      socket = new WebSocket(`${scheme}://${location.host}/ws`);
      socket.onmessage = (msg) => {
        const event = JSON.parse(msg.data);
        if (event.event === 'data_update') {
          render(event.data);
        }
      };
      socket.onclose = () => {
        setStatus('Connection lost, reconnecting...', 'error');
        setTimeout(connect, 3000);
      };
    };

    refreshBtn.addEventListener('click', async () => {
      if (socket && socket.readyState === WebSocket.OPEN) {
        socket.send(JSON.stringify({ event: 'request_update' }));
        setStatus('Refreshing...', '');
        return;
      }
      const res = await fetch('/api/refresh', { method: 'POST' });
      render(await res.json());
    });

    connect();
  </script>
</body>
</html>
"#;

const CONFIG_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="UTF-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1.0" />
  <title>Dashboard Settings</title>
  <style>{{STYLE}}</style>
</head>
<body>
  <main class="app">
    <header>
      <div>
        <h1>API settings</h1>
        <p class="subtitle" id="auth-message">{{AUTH_MESSAGE}}</p>
      </div>
      <a class="button secondary" href="/">Dashboard</a>
    </header>

    <section class="panel">
      <label>Client key
        <input id="client-key" autocomplete="off" />
      </label>
      <label>Client secret
        <input id="client-secret" type="password" autocomplete="off" />
      </label>
    </section>
    <section class="actions">
      <button id="save-btn" type="button">Save</button>
      <button class="secondary" id="test-btn" type="button">Check format</button>
      <button class="secondary" id="clear-btn" type="button">Clear configuration</button>
    </section>

    <section class="panel">
      <label>Redirect URI ({{REDIRECT_SOURCE}})
        <input id="redirect-uri" value="{{REDIRECT_URI_ATTR}}" />
      </label>
    </section>
    <p class="hint">Register <code id="redirect-current">{{REDIRECT_URI}}</code> as the redirect URI of your TikTok app.</p>
    <section class="actions">
      <button class="secondary" id="redirect-btn" type="button">Set redirect URI</button>
    </section>

    <section class="panel">
      <label>Authorization code
        <input id="manual-code" autocomplete="off" />
      </label>
      <label>State (optional)
        <input id="manual-state" autocomplete="off" />
      </label>
    </section>
    <section class="actions">
      <a class="button" href="/auth">Authorize TikTok</a>
      <button class="secondary" id="manual-btn" type="button">Submit code manually</button>
      <button class="secondary" id="probe-btn" type="button">Test API endpoints</button>
    </section>

    <div class="status" id="status"></div>
    <pre class="hint" id="probe-output"></pre>
  </main>

  <script>
    const statusEl = document.getElementById('status');
    const value = (id) => document.getElementById(id).value.trim();

    const setStatus = (message, type) => {
      statusEl.textContent = message;
      statusEl.dataset.type = type || '';
    };

    const post = async (url, body) => {
      const res = await fetch(url, {
        method: 'POST',
        headers: { 'Content-Type': 'application/json' },
        body: JSON.stringify(body || {})
      });
      const data = await res.json();
      setStatus(data.message, data.success ? '' : 'error');
      return data;
    };

    const credentials = () => ({ clientKey: value('client-key'), clientSecret: value('client-secret') });

    document.getElementById('save-btn').addEventListener('click', async () => {
      const data = await post('/api/config', credentials());
      if (data.success) {
        setTimeout(() => { location.href = '/'; }, 1200);
      }
    });

    document.getElementById('test-btn').addEventListener('click', () => post('/api/test_connection', credentials()));
    document.getElementById('clear-btn').addEventListener('click', () => post('/api/clear_config'));

    document.getElementById('redirect-btn').addEventListener('click', async () => {
      const data = await post('/api/set_redirect_uri', { redirect_uri: value('redirect-uri') });
      if (data.success) {
        document.getElementById('redirect-current').textContent = value('redirect-uri');
      }
    });

    document.getElementById('manual-btn').addEventListener('click', async () => {
      const data = await post('/api/manual_auth', { code: value('manual-code'), state: value('manual-state') });
      if (data.success) {
        setTimeout(() => { location.href = '/'; }, 1200);
      }
    });

    document.getElementById('probe-btn').addEventListener('click', async () => {
      const res = await fetch('/api/test_api_endpoints');
      const data = await res.json();
      setStatus(data.message, data.success ? '' : 'error');
      document.getElementById('probe-output').textContent = data.data ? JSON.stringify(data.data, null, 2) : '';
    });
  </script>
</body>
</html>
"#;

const TERMS_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="UTF-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1.0" />
  <title>Terms of Service</title>
  <style>{{STYLE}}</style>
</head>
<body>
  <main class="app">
    <header>
      <div>
        <h1>Terms of Service</h1>
        <p class="subtitle">Last updated {{DATE}}</p>
      </div>
      <a class="button secondary" href="/">Dashboard</a>
    </header>

    <section>
      <h2>Service</h2>
      <p>This dashboard shows analytics for the TikTok account you authorize. It reads your profile and video statistics through the TikTok Display API and displays them to you. It does not post, edit or delete content.</p>

      <h2>Your account</h2>
      <p>You authorize access through TikTok's own consent screen and can withdraw it at any time from your TikTok settings or by clearing the configuration on the settings page. You are responsible for keeping your API credentials confidential.</p>

      <h2>Estimated metrics</h2>
      <p>Average watch time, completion rate, bounce rate and new follower counts are estimates derived from public engagement numbers. They are not TikTok platform measurements and are provided as-is without warranty.</p>

      <h2>Acceptable use</h2>
      <p>Use the service only with accounts you own or are permitted to manage, and in line with TikTok's Terms of Service and developer policies.</p>

      <h2>Changes</h2>
      <p>These terms may change as the service evolves. The date above shows the latest revision.</p>
    </section>

    <p class="hint"><a href="/privacy">Privacy Policy</a></p>
  </main>
</body>
</html>
"#;

const PRIVACY_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="UTF-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1.0" />
  <title>Privacy Policy</title>
  <style>{{STYLE}}</style>
</head>
<body>
  <main class="app">
    <header>
      <div>
        <h1>Privacy Policy</h1>
        <p class="subtitle">Last updated {{DATE}}</p>
      </div>
      <a class="button secondary" href="/">Dashboard</a>
    </header>

    <section>
      <h2>What we access</h2>
      <p>With your consent we read your basic TikTok profile (open id, display name, avatar) and the list of your videos with their view, like, comment and share counts.</p>

      <h2>How it is stored</h2>
      <p>Access tokens and analytics snapshots are kept in server memory for your browser session only. Nothing is written to disk or a database, and everything is lost when the server restarts.</p>

      <h2>Sharing</h2>
      <p>Your data is shown only to the browser session that authorized it. It is not sold or shared with third parties.</p>

      <h2>Revoking access</h2>
      <p>Clearing the configuration revokes held tokens with TikTok and deletes them from memory. You can also remove the app from your TikTok account settings.</p>

      <h2>Cookies</h2>
      <p>A single session cookie identifies your browser. It carries no personal data.</p>
    </section>

    <p class="hint"><a href="/terms">Terms of Service</a></p>
  </main>
</body>
</html>
"#;
