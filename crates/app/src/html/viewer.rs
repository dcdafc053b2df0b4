/// Live viewer: the MJPEG feed, the latest code and product, and a manual
/// scan form.
pub const VIEWER_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1" />
  <title>Barcode Scanner</title>
  <style>
    :root { color-scheme: dark; }
    body {
      margin: 0;
      font-family: "Inter", "Segoe UI", sans-serif;
      background: #0f1115;
      color: #e6e6e6;
    }
    header {
      padding: 12px 20px;
      border-bottom: 1px solid #262a33;
      display: flex;
      justify-content: space-between;
      align-items: center;
    }
    header h1 { font-size: 18px; margin: 0; letter-spacing: 0.04em; }
    #health { font-size: 13px; padding: 4px 10px; border-radius: 12px; background: #333; }
    #health.ok { background: #1f6f3a; }
    #health.degraded { background: #8a2a1f; }
    main {
      display: grid;
      grid-template-columns: minmax(320px, 2fr) minmax(260px, 1fr);
      gap: 20px;
      padding: 20px;
    }
    #feed { width: 100%; border-radius: 6px; background: #000; }
    section.panel {
      background: #171a21;
      border: 1px solid #262a33;
      border-radius: 6px;
      padding: 14px 16px;
      margin-bottom: 16px;
    }
    section.panel h2 {
      font-size: 13px;
      text-transform: uppercase;
      color: #8b93a7;
      margin: 0 0 10px;
    }
    #barcode { font-family: monospace; font-size: 20px; word-break: break-all; }
    #symbology { color: #8b93a7; font-size: 12px; }
    pre { white-space: pre-wrap; word-break: break-word; margin: 0; font-size: 13px; }
    form { display: flex; gap: 8px; }
    input { flex: 1; padding: 6px 8px; background: #0f1115; color: inherit; border: 1px solid #333; border-radius: 4px; }
    button { padding: 6px 14px; border: 0; border-radius: 4px; background: #2f6fed; color: #fff; cursor: pointer; }
    #scan-result { margin-top: 8px; font-size: 13px; color: #8b93a7; }
  </style>
</head>
<body>
  <header>
    <h1>Barcode Scanner</h1>
    <span id="health">checking…</span>
  </header>
  <main>
    <div>
      <img id="feed" src="/video_feed" alt="Live camera feed" />
    </div>
    <div>
      <section class="panel">
        <h2>Latest code</h2>
        <div id="barcode">–</div>
        <div id="symbology"></div>
      </section>
      <section class="panel">
        <h2>Product</h2>
        <pre id="product">No product data yet</pre>
      </section>
      <section class="panel">
        <h2>Manual scan</h2>
        <form id="scan-form">
          <input id="scan-input" placeholder="Enter barcode" autocomplete="off" />
          <button type="submit">Look up</button>
        </form>
        <div id="scan-result"></div>
      </section>
    </div>
  </main>
  <script>
    const POLL_MS = 1000;

    async function fetchJson(path, options) {
      const response = await fetch(path, options);
      const body = await response.json().catch(() => ({}));
      return { ok: response.ok, status: response.status, body };
    }

    async function refreshBarcode() {
      const { ok, body } = await fetchJson('/latest_barcode');
      document.getElementById('barcode').textContent = ok ? body.data : '–';
      document.getElementById('symbology').textContent = ok ? body.type : (body.error || '');
    }

    async function refreshProduct() {
      const { ok, body } = await fetchJson('/latest_product');
      document.getElementById('product').textContent = ok
        ? JSON.stringify(body, null, 2)
        : (body.error || 'No product data yet');
    }

    async function refreshHealth() {
      const el = document.getElementById('health');
      try {
        const { ok, body } = await fetchJson('/health');
        el.textContent = `${body.status} · camera ${body.camera}`;
        el.className = ok ? 'ok' : 'degraded';
      } catch (err) {
        el.textContent = 'server unreachable';
        el.className = 'degraded';
      }
    }

    async function poll() {
      try {
        await Promise.all([refreshBarcode(), refreshProduct(), refreshHealth()]);
      } catch (err) {
        console.warn('poll failed', err);
      }
    }

    document.getElementById('scan-form').addEventListener('submit', async (event) => {
      event.preventDefault();
      const input = document.getElementById('scan-input');
      const result = document.getElementById('scan-result');
      result.textContent = 'Looking up…';
      const { ok, body } = await fetchJson('/scan', {
        method: 'POST',
        headers: { 'Content-Type': 'application/json' },
        body: JSON.stringify({ barcode: input.value.trim() }),
      });
      result.textContent = ok ? 'Found' : (body.error || 'Lookup failed');
      poll();
    });

    poll();
    setInterval(poll, POLL_MS);
  </script>
</body>
</html>
"#;
